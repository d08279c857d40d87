use crate::state::AppState;
use crate::ui::buffer_to_string;
use crate::ui::header::HeaderWidgets;
use adw::prelude::*;
use adw::{ApplicationWindow, ToastOverlay, WindowTitle};
use gtk4::{gio, glib};
use pyedit::files::{display_name, is_python_file, open_file, save_file, window_title};
use sourceview5::Buffer;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Title shows the file name with a leading `*` while there are unsaved edits.
pub fn refresh_title(window: &ApplicationWindow, title: &WindowTitle, path: Option<&Path>, modified: bool) {
    window.set_title(Some(&window_title(path, modified)));
    let name = display_name(path);
    title.set_title(&if modified { format!("*{}", name) } else { name });
    title.set_subtitle(&path.map(|p| p.display().to_string()).unwrap_or_default());
}

/// Runs `on_confirm` right away when the buffer is clean, otherwise after the
/// user agrees to drop the edits.
pub fn confirm_discard(window: &ApplicationWindow, buffer: &Buffer, on_confirm: impl FnOnce() + 'static) {
    if !buffer.is_modified() {
        on_confirm();
        return;
    }
    let dialog = adw::AlertDialog::new(
        Some("Discard unsaved changes?"),
        Some("The current file has edits that were not saved."),
    );
    dialog.add_responses(&[("cancel", "Cancel"), ("discard", "Discard")]);
    dialog.set_response_appearance("discard", adw::ResponseAppearance::Destructive);
    dialog.set_default_response(Some("cancel"));
    dialog.set_close_response("cancel");
    dialog.choose(Some(window), None::<&gio::Cancellable>, move |response| {
        if response == "discard" {
            on_confirm();
        }
    });
}

fn write_buffer(
    path: &Path,
    buffer: &Buffer,
    state: &Rc<RefCell<AppState>>,
    toast_overlay: &ToastOverlay,
) -> bool {
    let text = buffer_to_string(buffer.upcast_ref());
    match save_file(path, &text) {
        Ok(()) => {
            state.borrow_mut().current_file = Some(path.to_path_buf());
            buffer.set_modified(false);
            toast_overlay.add_toast(adw::Toast::new(&format!("Saved {}", display_name(Some(path)))));
            true
        }
        Err(e) => {
            tracing::error!("Failed to save: {:#}", e);
            toast_overlay.add_toast(adw::Toast::new(&format!("Save failed: {}", e)));
            false
        }
    }
}

pub fn save_as(
    window: &ApplicationWindow,
    buffer: &Buffer,
    state: Rc<RefCell<AppState>>,
    toast_overlay: &ToastOverlay,
) {
    let initial_name = state
        .borrow()
        .current_file
        .as_deref()
        .map_or_else(|| "untitled.py".to_string(), |p| display_name(Some(p)));
    let dialog = gtk4::FileDialog::builder()
        .title("Save File")
        .initial_name(initial_name.as_str())
        .build();

    dialog.save(
        Some(window),
        None::<&gio::Cancellable>,
        glib::clone!(
            #[strong]
            state,
            #[weak]
            buffer,
            #[weak]
            toast_overlay,
            move |res| {
                if let Some(path) = res.ok().and_then(|file| file.path()) {
                    write_buffer(&path, &buffer, &state, &toast_overlay);
                }
            }
        ),
    );
}

/// Saves to the current path, or asks for one.
pub fn save(
    window: &ApplicationWindow,
    buffer: &Buffer,
    state: Rc<RefCell<AppState>>,
    toast_overlay: &ToastOverlay,
) {
    let path = state.borrow().current_file.clone();
    match path {
        Some(path) => {
            write_buffer(&path, buffer, &state, toast_overlay);
        }
        None => save_as(window, buffer, state, toast_overlay),
    }
}

fn load_into(path: PathBuf, buffer: &Buffer, state: &Rc<RefCell<AppState>>, toast_overlay: &ToastOverlay) {
    match open_file(&path) {
        Ok(content) => {
            if !is_python_file(&path) {
                toast_overlay.add_toast(adw::Toast::new(&format!(
                    "{} is not a Python file; highlighting assumes Python",
                    display_name(Some(&path))
                )));
            }
            buffer.set_text(&content);
            buffer.place_cursor(&buffer.start_iter());
            state.borrow_mut().current_file = Some(path);
            buffer.set_modified(false);
        }
        Err(e) => {
            tracing::error!("Failed to open: {:#}", e);
            toast_overlay.add_toast(adw::Toast::new(&format!("Open failed: {}", e)));
        }
    }
}

/// Wires New, Open, Save and Save As plus the modified marker in the title.
pub fn connect_file_operations(
    header: &HeaderWidgets,
    window: &ApplicationWindow,
    buffer: &Buffer,
    state: Rc<RefCell<AppState>>,
    toast_overlay: &ToastOverlay,
) {
    buffer.connect_modified_changed(glib::clone!(
        #[weak]
        window,
        #[weak(rename_to = title)]
        header.title,
        #[strong]
        state,
        move |buf| {
            let path = state.borrow().current_file.clone();
            refresh_title(&window, &title, path.as_deref(), buf.is_modified());
        }
    ));

    header.new_btn.connect_clicked(glib::clone!(
        #[weak]
        window,
        #[weak]
        buffer,
        #[strong]
        state,
        #[weak(rename_to = title)]
        header.title,
        move |_| {
            confirm_discard(
                &window,
                &buffer,
                glib::clone!(
                    #[weak]
                    window,
                    #[weak]
                    buffer,
                    #[strong]
                    state,
                    #[weak]
                    title,
                    move || {
                        buffer.set_text("");
                        state.borrow_mut().current_file = None;
                        buffer.set_modified(false);
                        refresh_title(&window, &title, None, false);
                    }
                ),
            );
        }
    ));

    header.open_btn.connect_clicked(glib::clone!(
        #[weak]
        window,
        #[weak]
        buffer,
        #[strong]
        state,
        #[weak]
        toast_overlay,
        #[weak(rename_to = title)]
        header.title,
        move |_| {
            let pick = glib::clone!(
                #[weak]
                window,
                #[weak]
                buffer,
                #[strong]
                state,
                #[weak]
                toast_overlay,
                #[weak]
                title,
                move || {
                    let filter = gtk4::FileFilter::new();
                    filter.set_name(Some("Python files"));
                    filter.add_pattern("*.py");
                    filter.add_pattern("*.pyw");
                    let filters = gio::ListStore::new::<gtk4::FileFilter>();
                    filters.append(&filter);
                    let dialog = gtk4::FileDialog::builder()
                        .title("Open File")
                        .filters(&filters)
                        .build();

                    dialog.open(
                        Some(&window),
                        None::<&gio::Cancellable>,
                        glib::clone!(
                            #[weak]
                            window,
                            #[strong]
                            state,
                            #[weak]
                            buffer,
                            #[weak]
                            toast_overlay,
                            #[weak]
                            title,
                            move |res| {
                                if let Some(path) = res.ok().and_then(|file| file.path()) {
                                    load_into(path, &buffer, &state, &toast_overlay);
                                    let path = state.borrow().current_file.clone();
                                    refresh_title(&window, &title, path.as_deref(), buffer.is_modified());
                                }
                            }
                        ),
                    );
                }
            );
            confirm_discard(&window, &buffer, pick);
        }
    ));

    header.save_btn.connect_clicked(glib::clone!(
        #[weak]
        window,
        #[weak]
        buffer,
        #[strong]
        state,
        #[weak]
        toast_overlay,
        move |_| save(&window, &buffer, state.clone(), &toast_overlay)
    ));

    header.save_as_btn.connect_clicked(glib::clone!(
        #[weak]
        window,
        #[weak]
        buffer,
        #[strong]
        state,
        #[weak]
        toast_overlay,
        move |_| save_as(&window, &buffer, state.clone(), &toast_overlay)
    ));
}
