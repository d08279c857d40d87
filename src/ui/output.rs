use gtk4::prelude::*;
use gtk4::{ScrolledWindow, TextBuffer, TextMark, TextTag, TextView, WrapMode};
use pyedit::runner::RunEvent;

const STDOUT_TAG: &str = "stdout";
const STDERR_TAG: &str = "stderr";
const INFO_TAG: &str = "info";

/// Read-only pane showing program output, coloured by stream.
#[derive(Clone)]
pub struct OutputPane {
    view: TextView,
    buffer: TextBuffer,
    end_mark: TextMark,
}

impl OutputPane {
    pub fn new() -> (Self, ScrolledWindow) {
        let buffer = TextBuffer::new(None);
        let table = buffer.tag_table();
        table.add(&TextTag::builder().name(STDOUT_TAG).build());
        table.add(
            &TextTag::builder()
                .name(STDERR_TAG)
                .foreground("#e06c75")
                .build(),
        );
        table.add(
            &TextTag::builder()
                .name(INFO_TAG)
                .foreground("#61afef")
                .style(pango::Style::Italic)
                .build(),
        );
        let end_mark = buffer.create_mark(Some("output-end"), &buffer.end_iter(), false);

        let view = TextView::builder()
            .buffer(&buffer)
            .editable(false)
            .cursor_visible(false)
            .monospace(true)
            .wrap_mode(WrapMode::WordChar)
            .left_margin(8)
            .top_margin(4)
            .build();

        let scroll = ScrolledWindow::builder()
            .child(&view)
            .hexpand(true)
            .vexpand(true)
            .min_content_height(120)
            .build();

        (
            Self {
                view,
                buffer,
                end_mark,
            },
            scroll,
        )
    }

    pub fn clear(&self) {
        self.buffer.set_text("");
    }

    fn append(&self, text: &str, tag: &str) {
        let mut end = self.buffer.end_iter();
        self.buffer.insert_with_tags_by_name(&mut end, text, &[tag]);
        self.buffer.move_mark(&self.end_mark, &self.buffer.end_iter());
        self.view.scroll_mark_onscreen(&self.end_mark);
    }

    pub fn info(&self, text: &str) {
        self.append(&format!("{}\n", text), INFO_TAG);
    }

    pub fn error(&self, text: &str) {
        self.append(&format!("{}\n", text), STDERR_TAG);
    }

    /// Renders one runner event. Returns true when the run is over.
    pub fn show_event(&self, event: &RunEvent) -> bool {
        match event {
            RunEvent::Started { pid } => {
                match pid {
                    Some(pid) => self.info(&format!("Process started (pid {})", pid)),
                    None => self.info("Process started"),
                }
                false
            }
            RunEvent::Stdout(line) => {
                self.append(&format!("{}\n", line), STDOUT_TAG);
                false
            }
            RunEvent::Stderr(line) => {
                self.append(&format!("{}\n", line), STDERR_TAG);
                false
            }
            RunEvent::Exited(code) => {
                match code {
                    Some(code) => self.info(&format!("Process finished with exit code {}", code)),
                    None => self.info("Process terminated by a signal"),
                }
                true
            }
            RunEvent::Stopped => {
                self.info("Process stopped");
                true
            }
            RunEvent::Failed(message) => {
                self.error(message);
                true
            }
        }
    }
}
