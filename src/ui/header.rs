use adw::{HeaderBar, WindowTitle};
use gtk4::prelude::{BoxExt, WidgetExt};
use gtk4::{Box, Button, Orientation, ToggleButton};
use pyedit::constants::{APP_NAME, UNTITLED_NAME};

pub struct HeaderWidgets {
    pub header_bar: HeaderBar,
    pub title: WindowTitle,
    pub new_btn: Button,
    pub open_btn: Button,
    pub save_btn: Button,
    pub save_as_btn: Button,
    pub run_btn: Button,
    pub stop_btn: Button,
    pub format_btn: Button,
    pub terminal_btn: Button,
    pub settings_btn: Button,
    pub chat_toggle: ToggleButton,
}

fn icon_button(icon: &str, tooltip: &str) -> Button {
    Button::builder()
        .icon_name(icon)
        .tooltip_text(tooltip)
        .build()
}

/// Builds the header bar: file actions on the left, run controls next to
/// them, chat and settings on the right.
pub fn create_header_bar() -> HeaderWidgets {
    let header_bar = HeaderBar::new();
    let title = WindowTitle::new(APP_NAME, UNTITLED_NAME);
    header_bar.set_title_widget(Some(&title));

    let file_box = Box::new(Orientation::Horizontal, 0);
    file_box.add_css_class("linked");
    let new_btn = icon_button("document-new-symbolic", "New File (Ctrl+N)");
    let open_btn = icon_button("document-open-symbolic", "Open File (Ctrl+O)");
    let save_btn = icon_button("document-save-symbolic", "Save (Ctrl+S)");
    let save_as_btn = icon_button("document-save-as-symbolic", "Save As (Ctrl+Shift+S)");
    file_box.append(&new_btn);
    file_box.append(&open_btn);
    file_box.append(&save_btn);
    file_box.append(&save_as_btn);
    header_bar.pack_start(&file_box);

    let run_box = Box::new(Orientation::Horizontal, 0);
    run_box.add_css_class("linked");
    let run_btn = icon_button("media-playback-start-symbolic", "Run (F5)");
    run_btn.add_css_class("suggested-action");
    let stop_btn = icon_button("media-playback-stop-symbolic", "Stop");
    stop_btn.set_sensitive(false);
    let format_btn = icon_button("format-justify-left-symbolic", "Format with black");
    let terminal_btn = icon_button("utilities-terminal-symbolic", "Open Terminal Here");
    run_box.append(&run_btn);
    run_box.append(&stop_btn);
    run_box.append(&format_btn);
    run_box.append(&terminal_btn);
    header_bar.pack_start(&run_box);

    let settings_btn = icon_button("emblem-system-symbolic", "Settings");
    let chat_toggle = ToggleButton::builder()
        .icon_name("chat-bubbles-symbolic")
        .tooltip_text("Toggle Chat")
        .active(true)
        .build();
    header_bar.pack_end(&settings_btn);
    header_bar.pack_end(&chat_toggle);

    HeaderWidgets {
        header_bar,
        title,
        new_btn,
        open_btn,
        save_btn,
        save_as_btn,
        run_btn,
        stop_btn,
        format_btn,
        terminal_btn,
        settings_btn,
        chat_toggle,
    }
}
