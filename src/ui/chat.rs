use crate::state::AppState;
use crate::ui::{apply_spans, buffer_to_string, create_highlight_tags};
use adw::prelude::*;
use adw::{ApplicationWindow, ToastOverlay};
use gtk4::{
    gio, glib, Box, Button, CheckButton, DropDown, Entry, Label, Orientation, PolicyType,
    ScrolledWindow, Spinner, StringList, TextBuffer, TextMark, TextTag, TextView, WrapMode,
};
use pyedit::api::{
    drain_stream, ApiError, ChatBackend, ChatRole, Endpoint, StreamOutcome,
};
use pyedit::constants::HISTORY_CONTEXT_WINDOW;
use pyedit::highlight::{code_blocks, highlight_code_blocks};
use pyedit::history::{speaker, ChatHistory};
use sourceview5::Buffer;
use std::cell::RefCell;
use std::rc::Rc;
use tokio::sync::mpsc;

const SPEAKER_TAG: &str = "speaker";
const ERROR_TAG: &str = "chat_error";

enum ChatEvent {
    Delta(String),
    Finished(Result<StreamOutcome, ApiError>),
}

#[derive(Clone)]
pub struct ChatPanel {
    pub container: Box,
    endpoint_dropdown: DropDown,
    input: Entry,
    include_code: CheckButton,
    send_btn: Button,
    stop_btn: Button,
    clear_btn: Button,
    export_btn: Button,
    import_btn: Button,
    spinner: Spinner,
    view: TextView,
    buffer: TextBuffer,
    end_mark: TextMark,
}

pub fn create_chat_panel() -> ChatPanel {
    let container = Box::new(Orientation::Vertical, 6);
    container.set_width_request(340);
    container.set_margin_start(6);
    container.set_margin_end(6);
    container.set_margin_bottom(6);

    let labels: Vec<&str> = Endpoint::ALL.iter().map(|e| e.label()).collect();
    let endpoint_dropdown = DropDown::builder()
        .model(&StringList::new(&labels))
        .tooltip_text("Endpoint")
        .build();
    let spinner = Spinner::new();
    let clear_btn = Button::builder()
        .icon_name("edit-clear-all-symbolic")
        .tooltip_text("Clear History")
        .build();
    let export_btn = Button::builder()
        .icon_name("document-save-as-symbolic")
        .tooltip_text("Export Chat...")
        .build();
    let import_btn = Button::builder()
        .icon_name("document-open-symbolic")
        .tooltip_text("Import Chat...")
        .build();

    let top_row = Box::new(Orientation::Horizontal, 6);
    top_row.set_margin_top(6);
    let title = Label::builder()
        .label("<b>Assistant</b>")
        .use_markup(true)
        .xalign(0.0)
        .hexpand(true)
        .build();
    top_row.append(&title);
    top_row.append(&spinner);
    top_row.append(&endpoint_dropdown);
    top_row.append(&export_btn);
    top_row.append(&import_btn);
    top_row.append(&clear_btn);
    container.append(&top_row);

    let buffer = TextBuffer::new(None);
    create_highlight_tags(&buffer);
    let table = buffer.tag_table();
    table.add(&TextTag::builder().name(SPEAKER_TAG).weight(700).build());
    table.add(
        &TextTag::builder()
            .name(ERROR_TAG)
            .foreground("#e06c75")
            .build(),
    );
    let end_mark = buffer.create_mark(Some("chat-end"), &buffer.end_iter(), false);

    let view = TextView::builder()
        .buffer(&buffer)
        .editable(false)
        .cursor_visible(false)
        .wrap_mode(WrapMode::WordChar)
        .left_margin(6)
        .right_margin(6)
        .build();
    let scroll = ScrolledWindow::builder()
        .child(&view)
        .hscrollbar_policy(PolicyType::Never)
        .vexpand(true)
        .build();
    container.append(&scroll);

    let input = Entry::builder()
        .placeholder_text("Ask about your code...")
        .hexpand(true)
        .build();
    let send_btn = Button::builder()
        .icon_name("mail-send-symbolic")
        .tooltip_text("Send")
        .build();
    send_btn.add_css_class("suggested-action");
    let stop_btn = Button::builder()
        .icon_name("process-stop-symbolic")
        .tooltip_text("Stop Response")
        .sensitive(false)
        .build();
    let input_row = Box::new(Orientation::Horizontal, 6);
    input_row.append(&input);
    input_row.append(&send_btn);
    input_row.append(&stop_btn);
    container.append(&input_row);

    let include_code = CheckButton::with_label("Include editor code");
    container.append(&include_code);

    ChatPanel {
        container,
        endpoint_dropdown,
        input,
        include_code,
        send_btn,
        stop_btn,
        clear_btn,
        export_btn,
        import_btn,
        spinner,
        view,
        buffer,
        end_mark,
    }
}

impl ChatPanel {
    fn append(&self, text: &str, tags: &[&str]) {
        let mut end = self.buffer.end_iter();
        self.buffer.insert_with_tags_by_name(&mut end, text, tags);
        self.buffer.move_mark(&self.end_mark, &self.buffer.end_iter());
        self.view.scroll_mark_onscreen(&self.end_mark);
    }

    fn append_header(&self, role: ChatRole) {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        self.append(&format!("[{}] {}:\n", stamp, speaker(role)), &[SPEAKER_TAG]);
    }

    /// Highlights fenced code blocks from `start` (a character offset) on.
    fn highlight_from(&self, start: i32) {
        let from = self.buffer.iter_at_offset(start);
        let text = self.buffer.text(&from, &self.buffer.end_iter(), false);
        apply_spans(&self.buffer, &highlight_code_blocks(&text), start as usize);
    }

    /// Puts a copy button under the response for each fenced code block in it.
    fn add_copy_buttons(&self, response: &str) {
        let blocks = code_blocks(response);
        if blocks.is_empty() {
            return;
        }
        self.append("\n", &[]);
        for (i, block) in blocks.iter().enumerate() {
            let code = block.text(response);
            let label = match &block.language {
                Some(lang) => format!("Copy {} #{}", lang, i + 1),
                None => format!("Copy code #{}", i + 1),
            };
            let button = Button::builder().label(label.as_str()).build();
            button.add_css_class("flat");
            button.connect_clicked(move |btn| {
                btn.clipboard().set_text(&code);
                btn.set_label("Copied");
            });

            let mut end = self.buffer.end_iter();
            let anchor = self.buffer.create_child_anchor(&mut end);
            self.view.add_child_at_anchor(&button, &anchor);
        }
    }

    fn set_busy(&self, busy: bool) {
        self.send_btn.set_sensitive(!busy);
        self.stop_btn.set_sensitive(busy);
        if busy {
            self.spinner.start();
        } else {
            self.spinner.stop();
        }
    }

    /// Shows the persisted transcript of today's conversation.
    pub fn load_transcript(&self, transcript: &str) {
        self.buffer.set_text(transcript);
        self.highlight_from(0);
        self.buffer.move_mark(&self.end_mark, &self.buffer.end_iter());
        self.view.scroll_mark_onscreen(&self.end_mark);
    }

    fn selected_endpoint(&self) -> Endpoint {
        Endpoint::ALL
            .get(self.endpoint_dropdown.selected() as usize)
            .copied()
            .unwrap_or(Endpoint::Chat)
    }
}

fn send_prompt(
    panel: &ChatPanel,
    state: &Rc<RefCell<AppState>>,
    editor_buffer: &Buffer,
    toast_overlay: &ToastOverlay,
) {
    let question = panel.input.text().trim().to_string();
    if question.is_empty() || state.borrow().chat_busy {
        return;
    }
    let Some(client) = state.borrow().chat_client.clone() else {
        toast_overlay.add_toast(adw::Toast::new("Chat client unavailable; check Settings"));
        return;
    };

    let prompt = if panel.include_code.is_active() {
        let code = buffer_to_string(editor_buffer.upcast_ref());
        format!("{}\n\n```python\n{}\n```", question, code.trim_end())
    } else {
        question
    };
    panel.input.set_text("");

    panel.append_header(ChatRole::User);
    panel.append(&format!("{}\n\n", prompt), &[]);
    let user_start = panel.buffer.char_count() - prompt.chars().count() as i32 - 2;
    panel.highlight_from(user_start);

    let endpoint = panel.selected_endpoint();
    let (messages, stop, streaming) = {
        let mut s = state.borrow_mut();
        s.history.record(ChatRole::User, prompt.clone());
        s.save_history();
        s.chat_stop.reset();
        s.chat_busy = true;
        let streaming = endpoint.supports_streaming() && s.settings.stream_responses;
        (
            s.history.context_messages(HISTORY_CONTEXT_WINDOW),
            s.chat_stop.clone(),
            streaming,
        )
    };

    panel.set_busy(true);
    panel.append_header(ChatRole::Assistant);
    let response_start = panel.buffer.char_count();
    tracing::info!("Sending {} request ({} context messages)", endpoint.label(), messages.len());

    let (tx, mut rx) = mpsc::unbounded_channel::<ChatEvent>();
    let task = tokio::spawn(async move {
        let result = if streaming {
            match client.chat_stream(&messages).await {
                Ok(stream) => {
                    let deltas = tx.clone();
                    drain_stream(stream, &stop, move |delta| {
                        let _ = deltas.send(ChatEvent::Delta(delta.to_string()));
                    })
                    .await
                }
                Err(e) => Err(e),
            }
        } else if endpoint == Endpoint::Chat {
            client.chat(&messages).await.map(|text| StreamOutcome {
                text,
                interrupted: false,
            })
        } else {
            client.send(endpoint, &prompt).await.map(|text| StreamOutcome {
                text,
                interrupted: false,
            })
        };
        let _ = tx.send(ChatEvent::Finished(result));
    });
    if !streaming {
        state.borrow_mut().chat_task = Some(task.abort_handle());
    }

    let ctx = glib::MainContext::default();
    ctx.spawn_local(glib::clone!(
        #[strong]
        panel,
        #[strong]
        state,
        #[weak]
        toast_overlay,
        async move {
            let mut finished = false;
            while let Some(event) = rx.recv().await {
                match event {
                    ChatEvent::Delta(delta) => panel.append(&delta, &[]),
                    ChatEvent::Finished(result) => {
                        finish_response(&panel, &state, &toast_overlay, result, streaming, response_start);
                        finished = true;
                        break;
                    }
                }
            }
            // The channel closes without a result when Stop aborted the task.
            if !finished {
                tracing::info!("Chat request cancelled");
                panel.append("[request cancelled]\n\n", &[ERROR_TAG]);
            }
            let mut s = state.borrow_mut();
            s.chat_busy = false;
            s.chat_task = None;
            drop(s);
            panel.set_busy(false);
        }
    ));
}

fn finish_response(
    panel: &ChatPanel,
    state: &Rc<RefCell<AppState>>,
    toast_overlay: &ToastOverlay,
    result: Result<StreamOutcome, ApiError>,
    streamed: bool,
    response_start: i32,
) {
    match result {
        Ok(outcome) => {
            if !streamed {
                panel.append(&outcome.text, &[]);
            }
            panel.highlight_from(response_start);
            if outcome.interrupted {
                panel.append("\n[response stopped]", &[ERROR_TAG]);
            }
            panel.add_copy_buttons(&outcome.text);
            if !outcome.text.is_empty() {
                let mut s = state.borrow_mut();
                s.history.record(ChatRole::Assistant, outcome.text);
                s.save_history();
            }
        }
        Err(e) => {
            tracing::error!("Chat request failed: {}", e);
            panel.append(&format!("Error: {}", e), &[ERROR_TAG]);
            toast_overlay.add_toast(adw::Toast::new(&format!("Chat error: {}", e)));
        }
    }
    panel.append("\n\n", &[]);
}

fn chat_filters(json_only: bool) -> gio::ListStore {
    let filters = gio::ListStore::new::<gtk4::FileFilter>();
    let json = gtk4::FileFilter::new();
    json.set_name(Some("Chat history (JSON)"));
    json.add_pattern("*.json");
    filters.append(&json);
    if !json_only {
        let text = gtk4::FileFilter::new();
        text.set_name(Some("Transcript (TXT)"));
        text.add_pattern("*.txt");
        filters.append(&text);
    }
    filters
}

/// Saves the conversation as JSON or as a `.txt` transcript, by extension.
fn export_chat(window: &ApplicationWindow, state: &Rc<RefCell<AppState>>, toast_overlay: &ToastOverlay) {
    let dialog = gtk4::FileDialog::builder()
        .title("Export Chat")
        .initial_name(format!("chat_{}.txt", chrono::Local::now().format("%Y%m%d")).as_str())
        .filters(&chat_filters(false))
        .build();

    dialog.save(
        Some(window),
        None::<&gio::Cancellable>,
        glib::clone!(
            #[strong]
            state,
            #[weak]
            toast_overlay,
            move |res| {
                let Some(path) = res.ok().and_then(|file| file.path()) else {
                    return;
                };
                match state.borrow().history.export_to(&path) {
                    Ok(_) => toast_overlay.add_toast(adw::Toast::new(&format!("Chat saved to {}", path.display()))),
                    Err(e) => {
                        tracing::error!("Chat export failed: {:#}", e);
                        toast_overlay.add_toast(adw::Toast::new(&format!("Export failed: {}", e)));
                    }
                }
            }
        ),
    );
}

/// Replaces the current conversation with one exported as JSON.
fn import_chat(
    window: &ApplicationWindow,
    panel: &ChatPanel,
    state: &Rc<RefCell<AppState>>,
    toast_overlay: &ToastOverlay,
) {
    if state.borrow().chat_busy {
        toast_overlay.add_toast(adw::Toast::new("Wait for the current response first"));
        return;
    }
    let dialog = gtk4::FileDialog::builder()
        .title("Import Chat")
        .filters(&chat_filters(true))
        .build();

    dialog.open(
        Some(window),
        None::<&gio::Cancellable>,
        glib::clone!(
            #[strong]
            panel,
            #[strong]
            state,
            #[weak]
            toast_overlay,
            move |res| {
                let Some(path) = res.ok().and_then(|file| file.path()) else {
                    return;
                };
                match ChatHistory::load_from(&path) {
                    Ok(history) => {
                        let count = history.len();
                        let transcript = history.to_transcript();
                        {
                            let mut s = state.borrow_mut();
                            s.history = history;
                            s.save_history();
                        }
                        panel.load_transcript(&transcript);
                        toast_overlay.add_toast(adw::Toast::new(&format!("Loaded {} messages", count)));
                    }
                    Err(e) => {
                        tracing::error!("Chat import failed: {:#}", e);
                        toast_overlay.add_toast(adw::Toast::new(&format!("Import failed: {}", e)));
                    }
                }
            }
        ),
    );
}

pub fn connect_chat(
    window: &ApplicationWindow,
    panel: &ChatPanel,
    state: Rc<RefCell<AppState>>,
    editor_buffer: &Buffer,
    toast_overlay: &ToastOverlay,
) {
    let transcript = state.borrow().history.to_transcript();
    panel.load_transcript(&transcript);

    let send = Rc::new(glib::clone!(
        #[strong]
        panel,
        #[strong]
        state,
        #[weak]
        editor_buffer,
        #[weak]
        toast_overlay,
        move || send_prompt(&panel, &state, &editor_buffer, &toast_overlay)
    ));

    panel.send_btn.connect_clicked(glib::clone!(
        #[strong]
        send,
        move |_| send()
    ));
    panel.input.connect_activate(move |_| send());

    panel.stop_btn.connect_clicked(glib::clone!(
        #[strong]
        state,
        move |_| state.borrow_mut().stop_chat()
    ));

    panel.export_btn.connect_clicked(glib::clone!(
        #[strong]
        state,
        #[weak]
        window,
        #[weak]
        toast_overlay,
        move |_| export_chat(&window, &state, &toast_overlay)
    ));

    panel.import_btn.connect_clicked(glib::clone!(
        #[strong]
        panel,
        #[strong]
        state,
        #[weak]
        window,
        #[weak]
        toast_overlay,
        move |_| import_chat(&window, &panel, &state, &toast_overlay)
    ));

    panel.clear_btn.connect_clicked(glib::clone!(
        #[strong]
        panel,
        #[strong]
        state,
        move |_| {
            if state.borrow().chat_busy {
                return;
            }
            let mut s = state.borrow_mut();
            s.history.clear();
            s.save_history();
            panel.buffer.set_text("");
            tracing::info!("Chat history cleared");
        }
    ));
}
