//! Window assembly and the helpers shared by the UI components.

pub mod chat;
pub mod editor;
pub mod file_ops;
pub mod header;
pub mod output;
pub mod run;
pub mod settings;

use crate::state::AppState;
use adw::prelude::*;
use adw::{Application, ApplicationWindow, StyleManager, ToastOverlay};
use gtk4::{gdk, glib, Label, Orientation, Paned, TextTag};
use pyedit::api::ChatBackend;
use pyedit::config::{EditorSettings, ProxyConfig, Theme};
use pyedit::constants::{
    APP_NAME, CHAT_HISTORY_DIR, DEFAULT_WINDOW_HEIGHT, DEFAULT_WINDOW_WIDTH,
};
use pyedit::highlight::{Span, Tag};
use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;
use std::time::Duration;

pub fn buffer_to_string(buffer: &gtk4::TextBuffer) -> String {
    let (start, end) = buffer.bounds();
    buffer.text(&start, &end, false).to_string()
}

fn tag_style(tag: Tag) -> TextTag {
    let builder = TextTag::builder().name(tag.name());
    match tag {
        Tag::Keyword => builder.foreground("#c678dd").weight(700),
        Tag::Function => builder.foreground("#61afef"),
        Tag::Class => builder.foreground("#e5c07b").weight(700),
        Tag::SelfRef => builder.foreground("#e06c75").style(pango::Style::Italic),
        Tag::Number => builder.foreground("#d19a66"),
        Tag::Delimiter => builder.foreground("#7f848e"),
        Tag::String => builder.foreground("#98c379"),
        Tag::Comment => builder.foreground("#7f848e").style(pango::Style::Italic),
    }
    .build()
}

/// Registers one text tag per highlight category.
pub fn create_highlight_tags(buffer: &gtk4::TextBuffer) {
    let table = buffer.tag_table();
    for tag in Tag::ALL {
        table.add(&tag_style(tag));
    }
}

/// Applies `name` over a character range.
pub fn apply_span(buffer: &gtk4::TextBuffer, name: &str, range: Range<usize>) {
    let start = buffer.iter_at_offset(range.start as i32);
    let end = buffer.iter_at_offset(range.end as i32);
    buffer.apply_tag_by_name(name, &start, &end);
}

/// Applies highlight spans whose offsets are relative to `base`.
pub fn apply_spans(buffer: &gtk4::TextBuffer, spans: &[Span], base: usize) {
    for span in spans {
        apply_span(buffer, span.tag.name(), base + span.start..base + span.end);
    }
}

/// Restarts the one-shot timer in `slot`; only the last call within `delay_ms`
/// fires.
pub fn debounce(slot: &Rc<RefCell<Option<glib::SourceId>>>, delay_ms: u64, f: impl FnOnce() + 'static) {
    if let Some(source_id) = slot.borrow_mut().take() {
        source_id.remove();
    }
    let slot_clone = slot.clone();
    let source_id = glib::timeout_add_local_once(Duration::from_millis(delay_ms), move || {
        // The source is gone once it fires; forget it so it is not removed twice.
        *slot_clone.borrow_mut() = None;
        f();
    });
    *slot.borrow_mut() = Some(source_id);
}

fn apply_theme(style_manager: &StyleManager, theme: Theme) {
    style_manager.set_color_scheme(match theme {
        Theme::Dark => adw::ColorScheme::ForceDark,
        Theme::Light => adw::ColorScheme::ForceLight,
    });
}

fn create_status_bar() -> (gtk4::Box, Label, Label, Label) {
    let status_bar = gtk4::Box::new(Orientation::Horizontal, 12);
    status_bar.set_margin_start(12);
    status_bar.set_margin_end(12);
    status_bar.set_margin_top(4);
    status_bar.set_margin_bottom(4);
    status_bar.add_css_class("dim-label");

    let pos_label = Label::new(Some("Ln 1, Col 1"));
    let syntax_label = Label::new(Some(""));
    syntax_label.set_ellipsize(pango::EllipsizeMode::End);
    let server_label = Label::new(Some("LM Studio: checking..."));
    server_label.set_hexpand(true);
    server_label.set_halign(gtk4::Align::End);

    status_bar.append(&pos_label);
    status_bar.append(&syntax_label);
    status_bar.append(&server_label);
    (status_bar, pos_label, syntax_label, server_label)
}

/// Asks the model server for its models and reports the result in the
/// status bar.
fn refresh_server_status(state: &Rc<RefCell<AppState>>, label: &Label) {
    let Some(client) = state.borrow().chat_client.clone() else {
        label.set_text("LM Studio: not configured");
        return;
    };
    label.set_text("LM Studio: checking...");
    let ctx = glib::MainContext::default();
    ctx.spawn_local(glib::clone!(
        #[weak]
        label,
        async move {
            let result = tokio::spawn(async move { client.list_models().await }).await;
            match result {
                Ok(Ok(models)) => {
                    tracing::info!("Model server reachable, {} models", models.len());
                    label.set_text(&format!("LM Studio: {} models", models.len()));
                    label.set_tooltip_text(Some(&models.join("\n")));
                }
                Ok(Err(e)) => {
                    tracing::warn!("Model server unavailable: {}", e);
                    label.set_text("LM Studio: offline");
                    label.set_tooltip_text(Some(&e.to_string()));
                }
                Err(e) => tracing::error!("Model check task failed: {}", e),
            }
        }
    ));
}

pub fn build_ui(app: &Application) {
    let settings = EditorSettings::load();
    let proxy_config = ProxyConfig::load();
    let history_dir = EditorSettings::config_dir().join(CHAT_HISTORY_DIR);
    let state = Rc::new(RefCell::new(AppState::new(settings, proxy_config, history_dir)));

    let style_manager = StyleManager::default();
    apply_theme(&style_manager, state.borrow().settings.theme);

    let window = ApplicationWindow::builder()
        .application(app)
        .default_width(DEFAULT_WINDOW_WIDTH)
        .default_height(DEFAULT_WINDOW_HEIGHT)
        .title(APP_NAME)
        .build();

    let toast_overlay = ToastOverlay::new();
    window.set_content(Some(&toast_overlay));
    let content_box = gtk4::Box::new(Orientation::Vertical, 0);
    toast_overlay.set_child(Some(&content_box));

    let header = header::create_header_bar();
    content_box.append(&header.header_bar);

    let search = editor::create_search_bar();
    content_box.append(&search.revealer);

    let (buffer, editor_view, editor_scroll) = editor::create_editor(&style_manager);
    let font_provider = gtk4::CssProvider::new();
    #[allow(deprecated)]
    editor_view
        .style_context()
        .add_provider(&font_provider, gtk4::STYLE_PROVIDER_PRIORITY_APPLICATION);
    {
        let s = state.borrow();
        editor::apply_font(&font_provider, &s.settings.font_family, s.settings.font_size);
    }

    let (output, output_scroll) = output::OutputPane::new();
    let editor_paned = Paned::new(Orientation::Vertical);
    editor_paned.set_start_child(Some(&editor_scroll));
    editor_paned.set_end_child(Some(&output_scroll));
    editor_paned.set_position(DEFAULT_WINDOW_HEIGHT * 2 / 3);
    editor_paned.set_wide_handle(true);

    let chat_panel = chat::create_chat_panel();
    let main_paned = Paned::new(Orientation::Horizontal);
    main_paned.set_start_child(Some(&editor_paned));
    main_paned.set_end_child(Some(&chat_panel.container));
    main_paned.set_position(DEFAULT_WINDOW_WIDTH * 2 / 3);
    main_paned.set_wide_handle(true);
    main_paned.set_vexpand(true);
    content_box.append(&main_paned);

    header
        .chat_toggle
        .bind_property("active", &chat_panel.container, "visible")
        .sync_create()
        .build();

    let (status_bar, pos_label, syntax_label, server_label) = create_status_bar();
    content_box.append(&status_bar);

    editor::connect_highlighting(&buffer, state.clone(), &syntax_label);
    editor::connect_cursor_tracking(&buffer, &pos_label);
    let completion = editor::CompletionPopup::new(&editor_view, &buffer);
    editor::connect_key_handlers(&editor_view, &buffer, completion);
    editor::connect_search(&search, &editor_view, &buffer);
    file_ops::connect_file_operations(&header, &window, &buffer, state.clone(), &toast_overlay);
    run::connect_run_controls(&header, &buffer, state.clone(), &output, &toast_overlay);
    chat::connect_chat(&window, &chat_panel, state.clone(), &buffer, &toast_overlay);
    refresh_server_status(&state, &server_label);

    header.settings_btn.connect_clicked(glib::clone!(
        #[weak]
        window,
        #[strong]
        state,
        #[weak]
        toast_overlay,
        #[weak]
        server_label,
        #[strong]
        font_provider,
        #[strong]
        style_manager,
        move |_| {
            let on_closed: Rc<dyn Fn(Option<String>)> = Rc::new(glib::clone!(
                #[strong]
                state,
                #[weak]
                toast_overlay,
                #[weak]
                server_label,
                #[strong]
                font_provider,
                #[strong]
                style_manager,
                move |error: Option<String>| {
                    {
                        let s = state.borrow();
                        apply_theme(&style_manager, s.settings.theme);
                        editor::apply_font(&font_provider, &s.settings.font_family, s.settings.font_size);
                    }
                    if let Some(error) = error {
                        toast_overlay.add_toast(adw::Toast::new(&format!("Settings not saved: {}", error)));
                    }
                    refresh_server_status(&state, &server_label);
                }
            ));
            settings::show_settings(window.upcast_ref(), state.clone(), on_closed);
        }
    ));

    connect_shortcuts(&window, &header, &search, &editor_view);

    window.connect_close_request(glib::clone!(
        #[strong]
        state,
        move |_| {
            let mut s = state.borrow_mut();
            if let Some(mut run) = s.run.take() {
                run.stop();
            }
            s.stop_chat();
            s.save_history();
            tracing::info!("Shutting down");
            glib::Propagation::Proceed
        }
    ));

    buffer.set_modified(false);
    file_ops::refresh_title(&window, &header.title, None, false);
    editor_view.grab_focus();
    window.present();
}

/// Window-wide shortcuts: file actions, F5 to run, Ctrl+F for search.
fn connect_shortcuts(
    window: &ApplicationWindow,
    header: &header::HeaderWidgets,
    search: &editor::SearchWidgets,
    editor_view: &sourceview5::View,
) {
    let key_ctrl = gtk4::EventControllerKey::new();
    key_ctrl.set_propagation_phase(gtk4::PropagationPhase::Capture);
    window.add_controller(key_ctrl.clone());

    let new_btn = header.new_btn.downgrade();
    let open_btn = header.open_btn.downgrade();
    let save_btn = header.save_btn.downgrade();
    let save_as_btn = header.save_as_btn.downgrade();
    let run_btn = header.run_btn.downgrade();
    let search_revealer = search.revealer.downgrade();
    let search_entry = search.find_entry.downgrade();
    let editor_view = editor_view.downgrade();

    key_ctrl.connect_key_pressed(move |_, key, _, modifier| {
        let click = |btn: &glib::WeakRef<gtk4::Button>| {
            if let Some(btn) = btn.upgrade() {
                if btn.is_sensitive() {
                    btn.emit_clicked();
                }
            }
            glib::Propagation::Stop
        };

        if key == gdk::Key::F5 {
            return click(&run_btn);
        }
        if key == gdk::Key::Escape {
            if let (Some(revealer), Some(view)) = (search_revealer.upgrade(), editor_view.upgrade()) {
                if revealer.reveals_child() {
                    revealer.set_reveal_child(false);
                    view.grab_focus();
                    return glib::Propagation::Stop;
                }
            }
            return glib::Propagation::Proceed;
        }
        if !modifier.contains(gdk::ModifierType::CONTROL_MASK) {
            return glib::Propagation::Proceed;
        }

        let shift = modifier.contains(gdk::ModifierType::SHIFT_MASK);
        match key.to_lower() {
            gdk::Key::n => click(&new_btn),
            gdk::Key::o => click(&open_btn),
            gdk::Key::s if shift => click(&save_as_btn),
            gdk::Key::s => click(&save_btn),
            gdk::Key::f => {
                let (Some(revealer), Some(entry), Some(view)) =
                    (search_revealer.upgrade(), search_entry.upgrade(), editor_view.upgrade())
                else {
                    return glib::Propagation::Proceed;
                };
                let is_revealed = revealer.reveals_child();
                revealer.set_reveal_child(!is_revealed);
                if is_revealed {
                    view.grab_focus();
                } else {
                    entry.grab_focus();
                }
                glib::Propagation::Stop
            }
            _ => glib::Propagation::Proceed,
        }
    });
}
