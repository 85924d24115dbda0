//! Live terminal viewer built on ratatui-image.
//!
//! Picks the best graphics protocol the terminal supports (Sixel, Kitty,
//! iTerm2, falling back to halfblocks) and redraws every received frame
//! full-screen. Pressing `q`, `Esc` or `Ctrl-C` stops the viewer.

use std::io::{self, Stdout};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use image::{DynamicImage, RgbImage};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Layout};
use ratatui::style::{Color, Style};
use ratatui::widgets::Paragraph;
use ratatui::Terminal;
use ratatui_image::StatefulImage;
use ratatui_image::picker::{Picker, ProtocolType};
use ratatui_image::protocol::StatefulProtocol;
use tracing::{debug, info, warn};

use guardian_core::{DisplaySink, Frame, GuardianError};

// ── Protocol selection ───────────────────────────────────────────

/// Map a user-facing protocol name to a ratatui-image protocol.
pub fn protocol_from_name(name: &str) -> Option<ProtocolType> {
    match name.to_lowercase().as_str() {
        "sixel" => Some(ProtocolType::Sixel),
        "kitty" => Some(ProtocolType::Kitty),
        "iterm2" | "iterm" => Some(ProtocolType::Iterm2),
        "halfblocks" | "half" | "text" => Some(ProtocolType::Halfblocks),
        _ => None,
    }
}

/// Build a picker, honouring a forced protocol name if one is given.
///
/// Must run before the terminal enters raw mode.
pub fn create_picker(force_protocol: Option<&str>) -> Picker {
    if let Some(name) = force_protocol {
        match protocol_from_name(name) {
            Some(proto) => {
                let mut picker = Picker::halfblocks();
                picker.set_protocol_type(proto);
                info!("graphics: forced {proto:?}");
                return picker;
            }
            None => warn!("unknown graphics protocol '{name}', detecting"),
        }
    }

    match Picker::from_query_stdio() {
        Ok(picker) => {
            info!("graphics: detected {:?}", picker.protocol_type());
            picker
        }
        Err(e) => {
            debug!("terminal query failed: {e:?}");
            Picker::halfblocks()
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// `q`, `Esc` and `Ctrl-C` end the viewer. Raw mode turns Ctrl-C into a
/// key event instead of a signal.
pub fn is_quit_key(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Convert a decoded frame into an image ratatui-image can render.
pub fn frame_to_image(frame: &Frame) -> Result<DynamicImage, GuardianError> {
    let (width, height) = frame.dimensions();
    RgbImage::from_raw(width, height, frame.to_rgb8())
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| GuardianError::InvalidFrame(format!("{width}x{height} buffer")))
}

fn terminal_error(e: io::Error) -> GuardianError {
    GuardianError::Other(format!("terminal: {e}"))
}

// ── TerminalSink ─────────────────────────────────────────────────

/// Full-screen live display.
pub struct TerminalSink {
    /// `None` once the terminal has been restored.
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
    picker: Picker,
    protocol: Option<StatefulProtocol>,
    running: Arc<AtomicBool>,
    max_frames: Option<u64>,
    shown: u64,
    status: String,
}

impl TerminalSink {
    /// Take over the terminal: alternate screen, raw mode.
    pub fn open(
        running: Arc<AtomicBool>,
        force_protocol: Option<&str>,
    ) -> Result<Self, GuardianError> {
        let picker = create_picker(force_protocol);

        enable_raw_mode().map_err(terminal_error)?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(terminal_error(e));
        }
        let terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
            Ok(terminal) => terminal,
            Err(e) => {
                let _ = execute!(io::stdout(), LeaveAlternateScreen);
                let _ = disable_raw_mode();
                return Err(terminal_error(e));
            }
        };

        let mut sink = Self {
            terminal: Some(terminal),
            picker,
            protocol: None,
            running,
            max_frames: None,
            shown: 0,
            status: "waiting for frames... (q to quit)".into(),
        };
        sink.draw()?;
        Ok(sink)
    }

    pub fn with_max_frames(mut self, max: Option<u64>) -> Self {
        self.max_frames = max;
        self
    }

    fn draw(&mut self) -> Result<(), GuardianError> {
        let Some(terminal) = self.terminal.as_mut() else {
            return Ok(());
        };
        let protocol = &mut self.protocol;
        let status = self.status.as_str();

        terminal
            .draw(|f| {
                let [image_area, status_area] =
                    Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(f.area());
                match protocol.as_mut() {
                    Some(protocol) => {
                        f.render_stateful_widget(StatefulImage::default(), image_area, protocol)
                    }
                    None => f.render_widget(
                        Paragraph::new("no frame yet").alignment(Alignment::Center),
                        image_area,
                    ),
                }
                f.render_widget(
                    Paragraph::new(status).style(Style::default().fg(Color::DarkGray)),
                    status_area,
                );
            })
            .map_err(terminal_error)?;
        Ok(())
    }

    fn restore(&mut self) {
        let Some(mut terminal) = self.terminal.take() else {
            return;
        };
        if let Err(e) = disable_raw_mode() {
            warn!("disable raw mode: {e}");
        }
        if let Err(e) = execute!(terminal.backend_mut(), LeaveAlternateScreen) {
            warn!("leave alternate screen: {e}");
        }
        if let Err(e) = terminal.show_cursor() {
            warn!("show cursor: {e}");
        }
    }
}

impl DisplaySink for TerminalSink {
    fn show(&mut self, frame: &Frame) -> Result<(), GuardianError> {
        let image = frame_to_image(frame)?;
        self.protocol = Some(self.picker.new_resize_protocol(image));
        self.shown += 1;
        let (width, height) = frame.dimensions();
        self.status = format!("{width}x{height}  frame {}  (q to quit)", self.shown);
        self.draw()
    }

    fn should_stop(&mut self) -> bool {
        if !self.running.load(Ordering::SeqCst)
            || self.max_frames.is_some_and(|max| self.shown >= max)
        {
            return true;
        }
        loop {
            match event::poll(Duration::ZERO) {
                Ok(false) => return false,
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) if is_quit_key(&key) => return true,
                    Ok(Event::Resize(..)) => {
                        if let Err(e) = self.draw() {
                            warn!("redraw: {e}");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("terminal input: {e}");
                        return true;
                    }
                },
                Err(e) => {
                    warn!("terminal input: {e}");
                    return true;
                }
            }
        }
    }

    fn close(&mut self) {
        self.restore();
    }
}

impl Drop for TerminalSink {
    fn drop(&mut self) {
        self.restore();
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_core::PixelFormat;

    #[test]
    fn quit_keys() {
        let press = |code, modifiers| KeyEvent::new(code, modifiers);
        assert!(is_quit_key(&press(KeyCode::Char('q'), KeyModifiers::NONE)));
        assert!(is_quit_key(&press(KeyCode::Char('Q'), KeyModifiers::SHIFT)));
        assert!(is_quit_key(&press(KeyCode::Esc, KeyModifiers::NONE)));
        assert!(is_quit_key(&press(KeyCode::Char('c'), KeyModifiers::CONTROL)));

        assert!(!is_quit_key(&press(KeyCode::Char('c'), KeyModifiers::NONE)));
        assert!(!is_quit_key(&press(KeyCode::Char('x'), KeyModifiers::NONE)));
        assert!(!is_quit_key(&press(KeyCode::Enter, KeyModifiers::NONE)));
    }

    #[test]
    fn key_release_is_ignored() {
        let release =
            KeyEvent::new_with_kind(KeyCode::Char('q'), KeyModifiers::NONE, KeyEventKind::Release);
        assert!(!is_quit_key(&release));
    }

    #[test]
    fn protocol_names() {
        assert_eq!(protocol_from_name("Sixel"), Some(ProtocolType::Sixel));
        assert_eq!(protocol_from_name("iterm"), Some(ProtocolType::Iterm2));
        assert_eq!(protocol_from_name("text"), Some(ProtocolType::Halfblocks));
        assert_eq!(protocol_from_name("vt100"), None);
    }

    #[test]
    fn frame_converts_to_rgb_image() {
        let frame = Frame::filled(5, 3, PixelFormat::Bgra8, [10, 20, 30]);
        let image = frame_to_image(&frame).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (5, 3));
        assert_eq!(image.get_pixel(4, 2).0, [10, 20, 30]);
    }

    #[test]
    fn forced_protocol_skips_detection() {
        let picker = create_picker(Some("halfblocks"));
        assert_eq!(picker.protocol_type(), ProtocolType::Halfblocks);
    }
}
