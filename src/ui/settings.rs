use crate::state::AppState;
use adw::prelude::*;
use adw::{EntryRow, PreferencesGroup, PreferencesPage, PreferencesWindow, SpinRow, SwitchRow};
use gtk4::glib;
use pyedit::config::{EndpointConfig, ProxyConfig, Theme};
use std::cell::RefCell;
use std::rc::Rc;

fn port_row(title: &str, port: u16) -> SpinRow {
    let row = SpinRow::with_range(1.0, 65535.0, 1.0);
    row.set_title(title);
    row.set_value(f64::from(port));
    row
}

fn endpoint_group(title: &str, description: &str, endpoint: &EndpointConfig) -> (PreferencesGroup, EntryRow, SpinRow) {
    let group = PreferencesGroup::new();
    group.set_title(title);
    group.set_description(Some(description));
    let ip_row = EntryRow::builder().title("IP Address").build();
    ip_row.set_text(&endpoint.ip);
    let port = port_row("Port", endpoint.port);
    group.add(&ip_row);
    group.add(&port);
    (group, ip_row, port)
}

/// Preferences window. Changes are validated and saved when it closes;
/// `on_closed` receives an error message when the endpoint values were
/// rejected.
pub fn show_settings(
    parent: &gtk4::Window,
    state: Rc<RefCell<AppState>>,
    on_closed: Rc<dyn Fn(Option<String>)>,
) {
    let window = PreferencesWindow::builder()
        .transient_for(parent)
        .modal(true)
        .title("Settings")
        .default_width(520)
        .build();

    let (settings, proxy) = {
        let s = state.borrow();
        (s.settings.clone(), s.proxy_config.clone())
    };

    let page = PreferencesPage::new();
    page.set_title("Editor");
    page.set_icon_name(Some("text-editor-symbolic"));
    window.add(&page);

    let appearance = PreferencesGroup::new();
    appearance.set_title("Appearance");
    page.add(&appearance);
    let dark_row = SwitchRow::builder()
        .title("Dark Theme")
        .active(settings.theme == Theme::Dark)
        .build();
    let font_row = SpinRow::with_range(6.0, 48.0, 1.0);
    font_row.set_title("Font Size");
    font_row.set_value(f64::from(settings.font_size));
    appearance.add(&dark_row);
    appearance.add(&font_row);

    let python = PreferencesGroup::new();
    python.set_title("Python");
    page.add(&python);
    let interpreter_row = EntryRow::builder()
        .title("Interpreter (empty for default)")
        .build();
    interpreter_row.set_text(settings.interpreter.as_deref().unwrap_or(""));
    python.add(&interpreter_row);

    let page_ai = PreferencesPage::new();
    page_ai.set_title("Assistant");
    page_ai.set_icon_name(Some("chat-bubbles-symbolic"));
    window.add(&page_ai);

    let (lm_group, lm_ip, lm_port) =
        endpoint_group("LM Studio", "Serves chat, edit and completion requests", &proxy.lm_studio);
    let (agent_group, agent_ip, agent_port) =
        endpoint_group("Proxy Agent", "Serves agent requests", &proxy.proxy_agent);
    page_ai.add(&lm_group);
    page_ai.add(&agent_group);

    let model_group = PreferencesGroup::new();
    model_group.set_title("Model");
    let model_row = EntryRow::builder()
        .title("Model Name")
        .build();
    model_row.set_text(&settings.model);
    let stream_row = SwitchRow::builder()
        .title("Stream Responses")
        .active(settings.stream_responses)
        .build();
    model_group.add(&model_row);
    model_group.add(&stream_row);
    page_ai.add(&model_group);

    window.connect_close_request(glib::clone!(
        #[strong]
        state,
        move |_| {
            let candidate = ProxyConfig {
                lm_studio: EndpointConfig::new(lm_ip.text().trim(), lm_port.value() as u16),
                proxy_agent: EndpointConfig::new(
                    agent_ip.text().trim(),
                    agent_port.value() as u16,
                ),
            };

            let mut error = None;
            let mut s = state.borrow_mut();
            s.settings.theme = if dark_row.is_active() {
                Theme::Dark
            } else {
                Theme::Light
            };
            s.settings.font_size = font_row.value() as u32;
            let interpreter = interpreter_row.text().trim().to_string();
            s.settings.interpreter = (!interpreter.is_empty()).then_some(interpreter);
            let model = model_row.text().trim().to_string();
            if !model.is_empty() {
                s.settings.model = model;
            }
            s.settings.stream_responses = stream_row.is_active();
            if let Err(e) = s.settings.save() {
                tracing::error!("Failed to save settings: {}", e);
            }

            match candidate.validate() {
                Ok(()) => {
                    if let Err(e) = candidate.save() {
                        tracing::error!("Failed to save endpoint config: {}", e);
                        error = Some(e.to_string());
                    }
                    s.proxy_config = candidate;
                }
                Err(e) => {
                    tracing::warn!("Rejected endpoint config: {}", e);
                    error = Some(e.to_string());
                }
            }
            s.apply_settings();
            drop(s);

            on_closed(error);
            glib::Propagation::Proceed
        }
    ));

    window.present();
}
