use crate::state::AppState;
use crate::ui::buffer_to_string;
use crate::ui::header::HeaderWidgets;
use crate::ui::output::OutputPane;
use adw::prelude::*;
use adw::ToastOverlay;
use gtk4::glib;
use pyedit::files::{display_name, save_file};
use pyedit::formatter::{format_source, reconcile, FormatResult};
use pyedit::runner::{open_terminal, ProcessRunner, RunTarget};
use sourceview5::Buffer;
use std::cell::RefCell;
use std::rc::Rc;

/// Saves pending edits of a named file, then starts it. Untitled buffers run
/// as inline code.
fn start_run(
    buffer: &Buffer,
    state: &Rc<RefCell<AppState>>,
    output: &OutputPane,
    run_btn: &gtk4::Button,
    stop_btn: &gtk4::Button,
) {
    let text = buffer_to_string(buffer.upcast_ref());
    let path = state.borrow().current_file.clone();
    let target = match path {
        Some(path) => {
            if buffer.is_modified() {
                if let Err(e) = save_file(&path, &text) {
                    output.error(&format!("Could not save before running: {:#}", e));
                    return;
                }
                buffer.set_modified(false);
            }
            output.info(&format!("Running {}", display_name(Some(&path))));
            RunTarget::File(path)
        }
        None => {
            output.info("Running untitled buffer");
            RunTarget::Code(text)
        }
    };

    let interpreter = state.borrow().interpreter.clone();
    tracing::info!("Starting run with {}", interpreter.program().display());
    let (handle, mut events) = ProcessRunner::spawn(&interpreter, target);
    state.borrow_mut().run = Some(handle);

    let ctx = glib::MainContext::default();
    run_btn.set_sensitive(false);
    stop_btn.set_sensitive(true);
    ctx.spawn_local(glib::clone!(
        #[strong]
        output,
        #[strong]
        state,
        #[weak]
        run_btn,
        #[weak]
        stop_btn,
        async move {
            while let Some(event) = events.recv().await {
                if output.show_event(&event) {
                    break;
                }
            }
            state.borrow_mut().run = None;
            run_btn.set_sensitive(true);
            stop_btn.set_sensitive(false);
        }
    ));
}

pub fn connect_run_controls(
    header: &HeaderWidgets,
    buffer: &Buffer,
    state: Rc<RefCell<AppState>>,
    output: &OutputPane,
    toast_overlay: &ToastOverlay,
) {
    header.run_btn.connect_clicked(glib::clone!(
        #[weak]
        buffer,
        #[strong]
        state,
        #[strong]
        output,
        #[weak]
        toast_overlay,
        #[weak(rename_to = stop_btn)]
        header.stop_btn,
        move |run_btn| {
            if state.borrow().is_running() {
                toast_overlay.add_toast(adw::Toast::new("A program is already running"));
                return;
            }
            output.clear();
            start_run(&buffer, &state, &output, run_btn, &stop_btn);
        }
    ));

    header.stop_btn.connect_clicked(glib::clone!(
        #[strong]
        state,
        move |_| {
            if let Some(handle) = state.borrow_mut().run.as_mut() {
                if handle.stop() {
                    tracing::info!("Stop requested");
                }
            }
        }
    ));

    header.format_btn.connect_clicked(glib::clone!(
        #[weak]
        buffer,
        #[strong]
        state,
        #[weak]
        toast_overlay,
        move |format_btn| {
            let text = buffer_to_string(buffer.upcast_ref());
            if text.trim().is_empty() {
                return;
            }
            let interpreter = state.borrow().interpreter.clone();
            format_btn.set_sensitive(false);

            let ctx = glib::MainContext::default();
            ctx.spawn_local(glib::clone!(
                #[weak]
                buffer,
                #[weak]
                toast_overlay,
                #[weak]
                format_btn,
                async move {
                    let source = text.clone();
                    let result =
                        tokio::spawn(async move { format_source(&interpreter, &source).await })
                            .await;
                    format_btn.set_sensitive(true);
                    match result {
                        Ok(Ok(formatted)) => {
                            let current = buffer_to_string(buffer.upcast_ref());
                            match reconcile(&text, &current, formatted) {
                                FormatResult::Stale => {
                                    tracing::info!("Buffer edited while formatting, result dropped");
                                    toast_overlay
                                        .add_toast(adw::Toast::new("Buffer changed, format skipped"));
                                }
                                FormatResult::Unchanged => {
                                    toast_overlay.add_toast(adw::Toast::new("Already formatted"));
                                }
                                FormatResult::Replace(formatted) => {
                                    let cursor = buffer.cursor_position();
                                    buffer.begin_user_action();
                                    buffer.set_text(&formatted);
                                    buffer.end_user_action();
                                    let cursor = cursor.min(buffer.char_count());
                                    buffer.place_cursor(&buffer.iter_at_offset(cursor));
                                    toast_overlay.add_toast(adw::Toast::new("Formatted"));
                                }
                            }
                        }
                        Ok(Err(e)) => toast_overlay.add_toast(adw::Toast::new(&e.to_string())),
                        Err(e) => tracing::error!("Format task failed: {}", e),
                    }
                }
            ));
        }
    ));

    header.terminal_btn.connect_clicked(glib::clone!(
        #[strong]
        state,
        #[weak]
        toast_overlay,
        move |_| {
            let dir = state
                .borrow()
                .current_file
                .as_deref()
                .and_then(|p| p.parent())
                .filter(|d| !d.as_os_str().is_empty())
                .map(|d| d.to_path_buf())
                .or_else(|| std::env::current_dir().ok());
            let Some(dir) = dir else {
                return;
            };
            if let Err(e) = open_terminal(&dir) {
                tracing::warn!("Could not open a terminal: {}", e);
                toast_overlay.add_toast(adw::Toast::new(&format!("Could not open a terminal: {}", e)));
            }
        }
    ));
}
