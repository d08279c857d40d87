use crate::state::AppState;
use crate::ui::{apply_span, apply_spans, buffer_to_string, create_highlight_tags, debounce};
use adw::StyleManager;
use gtk4::gdk;
use gtk4::glib;
use gtk4::prelude::*;
use gtk4::{
    Box, Button, Entry, Label, ListBox, Orientation, Popover, Revealer, RevealerTransitionType,
    ScrolledWindow, SearchEntry, TextTag,
};
use pyedit::brackets::{closing_pair, find_match, is_empty_pair, should_skip_closer};
use pyedit::completion::{complete, word_prefix};
use pyedit::constants::{HIGHLIGHT_DEBOUNCE_MS, INDENT_WIDTH, SYNTAX_CHECK_DEBOUNCE_MS};
use pyedit::highlight::{highlight, Tag};
use pyedit::indent::{check_indentation, indent_ranges, next_line_indent, tab_text};
use pyedit::search::{find_all, find_next, replace_all};
use pyedit::syntax_check::{SyntaxIssue, SyntaxProbe};
use sourceview5::prelude::*;
use sourceview5::{Buffer, StyleSchemeManager, View};
use std::cell::RefCell;
use std::rc::Rc;

const INDENT_TAG: &str = "indent";
const BRACKET_TAG: &str = "bracket_match";
const SYNTAX_ERROR_TAG: &str = "syntax_error";

/// Creates the source view. Colouring comes from our own tags rather than a
/// sourceview language definition.
pub fn create_editor(style_manager: &StyleManager) -> (Buffer, View, ScrolledWindow) {
    let buffer = Buffer::new(None);
    buffer.set_highlight_syntax(false);
    buffer.set_highlight_matching_brackets(false);
    buffer.set_enable_undo(true);
    create_highlight_tags(buffer.upcast_ref());

    let table = buffer.tag_table();
    table.add(
        &TextTag::builder()
            .name(INDENT_TAG)
            .background("rgba(128, 128, 128, 0.08)")
            .build(),
    );
    table.add(
        &TextTag::builder()
            .name(BRACKET_TAG)
            .background("rgba(255, 200, 0, 0.35)")
            .weight(700)
            .build(),
    );
    table.add(
        &TextTag::builder()
            .name(SYNTAX_ERROR_TAG)
            .underline(pango::Underline::Error)
            .background("rgba(255, 0, 0, 0.12)")
            .build(),
    );

    let editor_view = View::with_buffer(&buffer);
    editor_view.set_monospace(true);
    editor_view.set_show_line_numbers(true);
    editor_view.set_highlight_current_line(true);
    editor_view.set_insert_spaces_instead_of_tabs(true);
    editor_view.set_indent_width(INDENT_WIDTH as i32);
    editor_view.set_tab_width(INDENT_WIDTH as u32);

    update_editor_theme(&buffer, style_manager.is_dark());
    style_manager.connect_dark_notify(glib::clone!(
        #[weak]
        buffer,
        move |sm| {
            update_editor_theme(&buffer, sm.is_dark());
        }
    ));

    let editor_scroll = ScrolledWindow::builder()
        .child(&editor_view)
        .hexpand(true)
        .vexpand(true)
        .build();

    (buffer, editor_view, editor_scroll)
}

fn update_editor_theme(buffer: &Buffer, is_dark: bool) {
    let scheme_manager = StyleSchemeManager::default();
    let scheme_id = if is_dark { "Adwaita-dark" } else { "Adwaita" };
    let fallback = if is_dark { "classic-dark" } else { "classic" };
    if let Some(scheme) = scheme_manager
        .scheme(scheme_id)
        .or_else(|| scheme_manager.scheme(fallback))
    {
        buffer.set_style_scheme(Some(&scheme));
    }
}

/// Font CSS for the editor view.
pub fn apply_font(provider: &gtk4::CssProvider, family: &str, size: u32) {
    provider.load_from_string(&format!(
        "textview {{ font-family: '{}'; font-size: {}pt; }}",
        family, size
    ));
}

/// Re-tags the whole buffer from scratch.
pub fn apply_highlighting(buffer: &gtk4::TextBuffer) {
    let text = buffer_to_string(buffer);
    let (start, end) = buffer.bounds();
    for tag in Tag::ALL {
        buffer.remove_tag_by_name(tag.name(), &start, &end);
    }
    buffer.remove_tag_by_name(INDENT_TAG, &start, &end);

    apply_spans(buffer, &highlight(&text), 0);
    for (line, width) in indent_ranges(&text) {
        if let Some(line_start) = buffer.iter_at_line(line as i32) {
            let offset = line_start.offset() as usize;
            apply_span(buffer, INDENT_TAG, offset..offset + width);
        }
    }
}

fn apply_syntax_issue(buffer: &gtk4::TextBuffer, issue: Option<&SyntaxIssue>) {
    let (start, end) = buffer.bounds();
    buffer.remove_tag_by_name(SYNTAX_ERROR_TAG, &start, &end);
    let Some(issue) = issue else {
        return;
    };
    if let Some(line_start) = buffer.iter_at_line(issue.line as i32 - 1) {
        let mut line_end = line_start.clone();
        if !line_end.ends_line() {
            line_end.forward_to_line_end();
        }
        buffer.apply_tag_by_name(SYNTAX_ERROR_TAG, &line_start, &line_end);
    }
}

/// Debounced re-highlighting and syntax probing on every edit.
pub fn connect_highlighting(buffer: &Buffer, state: Rc<RefCell<AppState>>, syntax_label: &Label) {
    let highlight_id = Rc::new(RefCell::new(None::<glib::SourceId>));
    let probe_id = Rc::new(RefCell::new(None::<glib::SourceId>));

    buffer.connect_changed(glib::clone!(
        #[strong]
        state,
        #[weak]
        syntax_label,
        move |buf| {
            let generation = {
                let mut s = state.borrow_mut();
                s.edit_generation += 1;
                s.edit_generation
            };

            debounce(
                &highlight_id,
                HIGHLIGHT_DEBOUNCE_MS,
                glib::clone!(
                    #[weak]
                    buf,
                    move || apply_highlighting(buf.upcast_ref())
                ),
            );
            debounce(
                &probe_id,
                SYNTAX_CHECK_DEBOUNCE_MS,
                glib::clone!(
                    #[weak]
                    buf,
                    #[strong]
                    state,
                    #[weak]
                    syntax_label,
                    move || spawn_syntax_check(&buf, state, &syntax_label, generation)
                ),
            );
        }
    ));
}

/// Compiles the buffer in the interpreter off the UI thread and tags the
/// offending line. Results for outdated text are dropped.
pub fn spawn_syntax_check(
    buffer: &Buffer,
    state: Rc<RefCell<AppState>>,
    label: &Label,
    generation: u64,
) {
    let text = buffer_to_string(buffer.upcast_ref());
    let indent_issue = check_indentation(&text).into_iter().next();
    let probe = SyntaxProbe::new(state.borrow().interpreter.clone());

    let ctx = glib::MainContext::default();
    ctx.spawn_local(glib::clone!(
        #[weak]
        buffer,
        #[weak]
        label,
        async move {
            let result = tokio::spawn(async move { probe.check(&text).await }).await;
            if state.borrow().edit_generation != generation {
                return;
            }
            match result {
                Ok(Ok(issue)) => {
                    apply_syntax_issue(buffer.upcast_ref(), issue.as_ref());
                    let message = match (issue, indent_issue) {
                        (Some(issue), _) => issue.to_string(),
                        (None, Some(indent)) => indent.to_string(),
                        (None, None) => "No syntax errors".to_string(),
                    };
                    label.set_text(&message);
                }
                Ok(Err(e)) => {
                    tracing::debug!("Syntax probe unavailable: {}", e);
                    label.set_text("Syntax check unavailable");
                }
                Err(e) => tracing::error!("Syntax probe task failed: {}", e),
            }
        }
    ));
}

fn update_bracket_match(buffer: &gtk4::TextBuffer) {
    let (start, end) = buffer.bounds();
    buffer.remove_tag_by_name(BRACKET_TAG, &start, &end);
    let text = buffer_to_string(buffer);
    if let Some(m) = find_match(&text, buffer.cursor_position() as usize) {
        apply_span(buffer, BRACKET_TAG, m.open..m.open + 1);
        apply_span(buffer, BRACKET_TAG, m.close..m.close + 1);
    }
}

/// Cursor position label and bracket-match tag.
pub fn connect_cursor_tracking(buffer: &Buffer, pos_label: &Label) {
    buffer.connect_cursor_position_notify(glib::clone!(
        #[weak]
        pos_label,
        move |buf| {
            let buf = buf.upcast_ref::<gtk4::TextBuffer>();
            let iter = buf.iter_at_mark(&buf.get_insert());
            pos_label.set_text(&format!(
                "Ln {}, Col {}",
                iter.line() + 1,
                iter.line_offset() + 1
            ));
            update_bracket_match(buf);
        }
    ));
}

/// Popup listing completion candidates for the word at the cursor.
#[derive(Clone)]
pub struct CompletionPopup {
    popover: Popover,
    list: ListBox,
    words: Rc<RefCell<Vec<String>>>,
}

impl CompletionPopup {
    pub fn new(view: &View, buffer: &Buffer) -> Self {
        let list = ListBox::new();
        list.set_selection_mode(gtk4::SelectionMode::Browse);
        let scroll = ScrolledWindow::builder()
            .child(&list)
            .max_content_height(220)
            .propagate_natural_height(true)
            .min_content_width(200)
            .build();
        let popover = Popover::builder()
            .child(&scroll)
            .has_arrow(false)
            .autohide(true)
            .position(gtk4::PositionType::Bottom)
            .build();
        popover.set_parent(view);

        let words = Rc::new(RefCell::new(Vec::<String>::new()));
        list.connect_row_activated(glib::clone!(
            #[weak]
            buffer,
            #[weak]
            popover,
            #[weak]
            view,
            #[strong]
            words,
            move |_, row| {
                let word = words.borrow().get(row.index() as usize).cloned();
                if let Some(word) = word {
                    insert_completion(buffer.upcast_ref(), &word);
                }
                popover.popdown();
                view.grab_focus();
            }
        ));

        Self {
            popover,
            list,
            words,
        }
    }

    pub fn show(&self, view: &View, buffer: &gtk4::TextBuffer) {
        let text = buffer_to_string(buffer);
        let cursor = buffer.cursor_position();
        let words = complete(&text, cursor as usize);
        if words.is_empty() {
            return;
        }

        self.list.remove_all();
        for word in &words {
            self.list
                .append(&Label::builder().label(word.as_str()).xalign(0.0).build());
        }
        *self.words.borrow_mut() = words;

        let rect = view.iter_location(&buffer.iter_at_offset(cursor));
        let (x, y) =
            view.buffer_to_window_coords(gtk4::TextWindowType::Widget, rect.x(), rect.y());
        self.popover
            .set_pointing_to(Some(&gdk::Rectangle::new(x, y, 1, rect.height())));
        self.popover.popup();
        if let Some(row) = self.list.row_at_index(0) {
            self.list.select_row(Some(&row));
            row.grab_focus();
        }
    }
}

fn insert_completion(buffer: &gtk4::TextBuffer, word: &str) {
    let text = buffer_to_string(buffer);
    let cursor = buffer.cursor_position() as usize;
    let (start, _) = word_prefix(&text, cursor);
    let mut from = buffer.iter_at_offset(start as i32);
    let mut to = buffer.iter_at_offset(cursor as i32);
    buffer.begin_user_action();
    buffer.delete(&mut from, &mut to);
    buffer.insert(&mut from, word);
    buffer.end_user_action();
}

/// Auto-pairing, smart Enter/Tab/Backspace and the completion shortcut.
pub fn connect_key_handlers(view: &View, buffer: &Buffer, completion: CompletionPopup) {
    let key_ctrl = gtk4::EventControllerKey::new();
    key_ctrl.set_propagation_phase(gtk4::PropagationPhase::Capture);
    view.add_controller(key_ctrl.clone());

    let view_weak = view.downgrade();
    let buffer_weak = buffer.downgrade();
    key_ctrl.connect_key_pressed(move |_, key, _, modifier| {
        let (Some(view), Some(buffer)) = (view_weak.upgrade(), buffer_weak.upgrade()) else {
            return glib::Propagation::Proceed;
        };
        let buf = buffer.upcast_ref::<gtk4::TextBuffer>();

        if modifier.contains(gdk::ModifierType::CONTROL_MASK) {
            if key == gdk::Key::space {
                completion.show(&view, buf);
                return glib::Propagation::Stop;
            }
            return glib::Propagation::Proceed;
        }
        if modifier.intersects(gdk::ModifierType::ALT_MASK | gdk::ModifierType::SUPER_MASK) {
            return glib::Propagation::Proceed;
        }

        if handle_edit_key(buf, key) {
            view.scroll_mark_onscreen(&buf.get_insert());
            glib::Propagation::Stop
        } else {
            glib::Propagation::Proceed
        }
    });
}

/// Returns true when the key press was consumed.
fn handle_edit_key(buffer: &gtk4::TextBuffer, key: gdk::Key) -> bool {
    let has_selection = buffer.has_selection();
    let cursor = buffer.cursor_position() as usize;

    match key {
        gdk::Key::Return | gdk::Key::KP_Enter => {
            buffer.begin_user_action();
            buffer.delete_selection(true, true);
            let cursor_iter = buffer.iter_at_mark(&buffer.get_insert());
            let mut line_start = cursor_iter.clone();
            line_start.set_line_offset(0);
            let line = buffer.text(&line_start, &cursor_iter, false);
            buffer.insert_at_cursor(&format!("\n{}", next_line_indent(&line)));
            buffer.end_user_action();
            true
        }
        gdk::Key::Tab if !has_selection => {
            buffer.insert_at_cursor(&tab_text());
            true
        }
        gdk::Key::BackSpace if !has_selection => {
            let text = buffer_to_string(buffer);
            if !is_empty_pair(&text, cursor) {
                return false;
            }
            let mut from = buffer.iter_at_offset(cursor as i32 - 1);
            let mut to = buffer.iter_at_offset(cursor as i32 + 1);
            buffer.delete(&mut from, &mut to);
            true
        }
        _ => {
            let Some(ch) = key.to_unicode() else {
                return false;
            };
            let text = buffer_to_string(buffer);
            if !has_selection && should_skip_closer(&text, cursor, ch) {
                buffer.place_cursor(&buffer.iter_at_offset(cursor as i32 + 1));
                return true;
            }
            let Some(close) = closing_pair(ch) else {
                return false;
            };
            // Apostrophes inside words stay single.
            let prev = cursor.checked_sub(1).and_then(|i| text.chars().nth(i));
            if matches!(ch, '\'' | '"') && prev.is_some_and(|c| c.is_alphanumeric()) {
                return false;
            }
            buffer.begin_user_action();
            buffer.delete_selection(true, true);
            buffer.insert_at_cursor(&format!("{}{}", ch, close));
            let after = buffer.cursor_position();
            buffer.place_cursor(&buffer.iter_at_offset(after - 1));
            buffer.end_user_action();
            true
        }
    }
}

pub struct SearchWidgets {
    pub revealer: Revealer,
    pub find_entry: SearchEntry,
    pub replace_entry: Entry,
    next_btn: Button,
    replace_all_btn: Button,
    status: Label,
}

/// Find/replace bar shown with Ctrl+F.
pub fn create_search_bar() -> SearchWidgets {
    let revealer = Revealer::builder()
        .transition_type(RevealerTransitionType::SlideDown)
        .build();
    let find_entry = SearchEntry::builder()
        .hexpand(true)
        .placeholder_text("Find...")
        .build();
    let replace_entry = Entry::builder()
        .hexpand(true)
        .placeholder_text("Replace with...")
        .build();
    let next_btn = Button::builder()
        .icon_name("go-down-symbolic")
        .tooltip_text("Find Next")
        .build();
    let replace_all_btn = Button::with_label("Replace All");
    let status = Label::new(None);
    status.add_css_class("dim-label");

    let search_box = Box::new(Orientation::Horizontal, 6);
    search_box.set_margin_start(12);
    search_box.set_margin_end(12);
    search_box.set_margin_top(6);
    search_box.set_margin_bottom(6);
    search_box.append(&find_entry);
    search_box.append(&next_btn);
    search_box.append(&replace_entry);
    search_box.append(&replace_all_btn);
    search_box.append(&status);
    revealer.set_child(Some(&search_box));

    SearchWidgets {
        revealer,
        find_entry,
        replace_entry,
        next_btn,
        replace_all_btn,
        status,
    }
}

fn select_next(view: &View, buffer: &gtk4::TextBuffer, needle: &str, from: usize) -> usize {
    let text = buffer_to_string(buffer);
    let count = find_all(&text, needle).len();
    if let Some(range) = find_next(&text, needle, from) {
        let start = buffer.iter_at_offset(range.start as i32);
        let end = buffer.iter_at_offset(range.end as i32);
        buffer.select_range(&start, &end);
        let mut start = start;
        view.scroll_to_iter(&mut start, 0.1, false, 0.0, 0.0);
    }
    count
}

fn match_status(count: usize) -> String {
    match count {
        0 => "No matches".to_string(),
        1 => "1 match".to_string(),
        n => format!("{} matches", n),
    }
}

pub fn connect_search(search: &SearchWidgets, view: &View, buffer: &Buffer) {
    // Typing searches from the start of the current selection so the
    // match under the cursor stays selected.
    search.find_entry.connect_search_changed(glib::clone!(
        #[weak]
        view,
        #[weak]
        buffer,
        #[weak(rename_to = status)]
        search.status,
        move |entry| {
            let buf = buffer.upcast_ref::<gtk4::TextBuffer>();
            let needle = entry.text();
            if needle.is_empty() {
                status.set_text("");
                return;
            }
            let from = buf
                .selection_bounds()
                .map_or(buf.cursor_position(), |(start, _)| start.offset());
            let count = select_next(&view, buf, &needle, from as usize);
            status.set_text(&match_status(count));
        }
    ));

    let find_next_action = glib::clone!(
        #[weak]
        view,
        #[weak]
        buffer,
        #[weak(rename_to = entry)]
        search.find_entry,
        #[weak(rename_to = status)]
        search.status,
        move || {
            let buf = buffer.upcast_ref::<gtk4::TextBuffer>();
            let from = buf
                .selection_bounds()
                .map_or(buf.cursor_position(), |(_, end)| end.offset());
            let count = select_next(&view, buf, &entry.text(), from as usize);
            status.set_text(&match_status(count));
        }
    );
    let find_next_action = Rc::new(find_next_action);

    search.find_entry.connect_activate(glib::clone!(
        #[strong]
        find_next_action,
        move |_| find_next_action()
    ));
    search.next_btn.connect_clicked(move |_| find_next_action());

    search.replace_all_btn.connect_clicked(glib::clone!(
        #[weak]
        buffer,
        #[weak(rename_to = find_entry)]
        search.find_entry,
        #[weak(rename_to = replace_entry)]
        search.replace_entry,
        #[weak(rename_to = status)]
        search.status,
        move |_| {
            let buf = buffer.upcast_ref::<gtk4::TextBuffer>();
            let text = buffer_to_string(buf);
            let (replaced, count) =
                replace_all(&text, &find_entry.text(), &replace_entry.text());
            if count > 0 {
                buf.begin_user_action();
                buf.set_text(&replaced);
                buf.end_user_action();
            }
            status.set_text(&format!("Replaced {}", count));
        }
    ));
}
