//! Buffer snapshots
//!
//! A snapshot's `data` is a replay stream: every physical line (scrollback
//! first) rendered as text with SGR attributes, lines separated by CRLF,
//! followed by a cursor-position sequence. Writing it into an empty buffer of
//! the recorded size reproduces the cell contents, the scrollback/visible
//! split and the cursor. Soft-wrapped lines are not separated, so they wrap
//! again on replay. When the alternate screen is up, the stream holds the
//! primary screen, then `?1049h`, then the alternate grid.

use crate::core::state::BufferSnapshot;
use crate::terminal::buffer::TerminalBuffer;
use std::fmt::Write as _;
use tracing::{debug, info};
use wezterm_cell::color::ColorAttribute;
use wezterm_cell::{CellAttributes, Intensity, Underline};
use wezterm_term::color::ColorPalette;
use wezterm_term::Terminal;

/// Switch to the alternate screen, saving the cursor
const ENTER_ALT_SCREEN: &str = "\x1b[?1049h";

/// Attributes carried into the snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
struct Style {
    foreground: ColorAttribute,
    background: ColorAttribute,
    intensity: Intensity,
    italic: bool,
    underline: bool,
    reverse: bool,
    strikethrough: bool,
}

impl Style {
    fn of(attrs: &CellAttributes) -> Self {
        Self {
            foreground: attrs.foreground(),
            background: attrs.background(),
            intensity: attrs.intensity(),
            italic: attrs.italic(),
            underline: attrs.underline() != Underline::None,
            reverse: attrs.reverse(),
            strikethrough: attrs.strikethrough(),
        }
    }

    fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Full SGR sequence selecting this style from a reset state
    fn sgr(&self) -> String {
        let mut params = vec!["0".to_string()];
        match self.intensity {
            Intensity::Bold => params.push("1".into()),
            Intensity::Half => params.push("2".into()),
            Intensity::Normal => {}
        }
        if self.italic {
            params.push("3".into());
        }
        if self.underline {
            params.push("4".into());
        }
        if self.reverse {
            params.push("7".into());
        }
        if self.strikethrough {
            params.push("9".into());
        }
        push_color(&mut params, self.foreground, 38);
        push_color(&mut params, self.background, 48);
        format!("\x1b[{}m", params.join(";"))
    }
}

impl Default for Style {
    fn default() -> Self {
        Self {
            foreground: ColorAttribute::Default,
            background: ColorAttribute::Default,
            intensity: Intensity::Normal,
            italic: false,
            underline: false,
            reverse: false,
            strikethrough: false,
        }
    }
}

fn to_u8(component: f32) -> u8 {
    (component.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn push_color(params: &mut Vec<String>, color: ColorAttribute, base: u8) {
    match color {
        ColorAttribute::Default => {}
        ColorAttribute::PaletteIndex(idx) => params.push(format!("{};5;{}", base, idx)),
        ColorAttribute::TrueColorWithPaletteFallback(c, _)
        | ColorAttribute::TrueColorWithDefaultFallback(c) => params.push(format!(
            "{};2;{};{};{}",
            base,
            to_u8(c.0),
            to_u8(c.1),
            to_u8(c.2)
        )),
    }
}

/// One styled run of text
struct Run {
    style: Style,
    text: String,
}

/// Styled runs of one physical line
struct RenderedLine {
    runs: Vec<Run>,
    /// The line soft-wraps into the next one
    wrapped: bool,
}

/// Styled runs of every physical line of the active screen. Trailing default
/// blanks are dropped unless the line wraps, since a wrapped line has to fill
/// the row for the replay to wrap at the same column.
fn collect_lines(term: &mut Terminal) -> Vec<RenderedLine> {
    let screen = term.screen_mut();
    let total = screen.scrollback_rows();
    (0..total)
        .map(|idx| {
            let line = screen.line_mut(idx);
            let wrapped = idx + 1 < total && line.last_cell_was_wrapped();
            let mut runs: Vec<Run> = Vec::new();
            for cell in line.visible_cells() {
                let style = Style::of(cell.attrs());
                let text = cell.str();
                match runs.last_mut() {
                    Some(run) if run.style == style => run.text.push_str(text),
                    _ => runs.push(Run {
                        style,
                        text: text.to_string(),
                    }),
                }
            }
            if !wrapped {
                trim_trailing_blanks(&mut runs);
            }
            RenderedLine { runs, wrapped }
        })
        .collect()
}

fn trim_trailing_blanks(runs: &mut Vec<Run>) {
    while let Some(run) = runs.last_mut() {
        if !run.style.is_default() {
            break;
        }
        let trimmed = run.text.trim_end_matches(' ').len();
        run.text.truncate(trimmed);
        if !run.text.is_empty() {
            break;
        }
        runs.pop();
    }
}

/// Replay stream for the active screen: every physical line with SGR
/// attributes, then the cursor position. Soft-wrapped lines run straight into
/// their continuation so the emulator wraps them again.
pub(crate) fn render_screen(term: &mut Terminal) -> String {
    let columns = term.screen().physical_cols;
    let rows = term.screen().physical_rows;
    let cursor = term.cursor_pos();
    let lines = collect_lines(term);

    let mut data = String::new();
    for (idx, line) in lines.iter().enumerate() {
        if idx > 0 && !lines[idx - 1].wrapped {
            data.push_str("\r\n");
        }
        let mut styled = false;
        for run in &line.runs {
            if run.style.is_default() {
                if styled {
                    data.push_str("\x1b[0m");
                    styled = false;
                }
            } else {
                data.push_str(&run.style.sgr());
                styled = true;
            }
            data.push_str(&run.text);
        }
        if styled {
            data.push_str("\x1b[0m");
        }
    }

    let row = cursor.y.clamp(0, rows.saturating_sub(1) as i64) + 1;
    let col = cursor.x.min(columns.saturating_sub(1)) + 1;
    let _ = write!(data, "\x1b[{};{}H", row, col);
    data
}

/// Converts between a live [`TerminalBuffer`] and a [`BufferSnapshot`].
///
/// Callers must not feed output into the buffer while a restore is running.
pub struct BufferSerializer;

impl BufferSerializer {
    /// Capture dimensions, scrollback, visible rows and cursor. While the
    /// alternate screen is up, the primary screen (with its scrollback) is
    /// captured first and the alternate grid is replayed after `?1049h`.
    pub fn serialize(buffer: &mut TerminalBuffer) -> BufferSnapshot {
        let columns = buffer.columns();
        let rows = buffer.rows();
        let active = buffer.with_terminal_mut(render_screen);

        let data = match buffer.saved_primary() {
            Some(primary) => format!("{}{}\x1b[H{}", primary, ENTER_ALT_SCREEN, active),
            None => active,
        };

        debug!(
            "Serialized buffer {}x{} ({} bytes, alternate screen: {})",
            columns,
            rows,
            data.len(),
            buffer.is_alt_screen()
        );
        BufferSnapshot {
            columns,
            rows,
            data,
        }
    }

    /// Replace the contents of `buffer` with `snapshot`, leaving it at exactly
    /// the recorded dimensions. No output may be written concurrently.
    pub fn deserialize(buffer: &mut TerminalBuffer, snapshot: &BufferSnapshot) {
        buffer.reset(snapshot.columns, snapshot.rows);
        buffer.advance_bytes(snapshot.data.as_bytes());
        buffer.resize(snapshot.columns, snapshot.rows);
        info!(
            "Restored buffer {}x{} from snapshot ({} bytes)",
            snapshot.columns,
            snapshot.rows,
            snapshot.data.len()
        );
    }

    /// Render scrollback and visible rows as a standalone HTML `<pre>` block
    pub fn to_html(buffer: &mut TerminalBuffer) -> String {
        let palette = buffer.palette().clone();
        let lines = buffer.with_terminal_mut(collect_lines);
        let last = lines
            .iter()
            .rposition(|line| !line.runs.is_empty())
            .map(|idx| idx + 1)
            .unwrap_or(0);

        let default_bg = css_color(&palette, ColorAttribute::Default, false);
        let default_fg = css_color(&palette, ColorAttribute::Default, true);
        let mut html = String::new();
        let _ = write!(
            html,
            "<pre style=\"background-color:{};color:{};font-family:monospace;white-space:pre;margin:0;\">",
            default_bg, default_fg
        );
        for (idx, line) in lines[..last].iter().enumerate() {
            if idx > 0 {
                html.push('\n');
            }
            for run in &line.runs {
                if run.style.is_default() {
                    html.push_str(&escape_html(&run.text));
                    continue;
                }
                let _ = write!(
                    html,
                    "<span style=\"{}\">{}</span>",
                    css_style(&palette, &run.style),
                    escape_html(&run.text)
                );
            }
        }
        html.push_str("</pre>");
        html
    }
}

fn css_color(palette: &ColorPalette, color: ColorAttribute, foreground: bool) -> String {
    let srgba = if foreground {
        palette.resolve_fg(color)
    } else {
        palette.resolve_bg(color)
    };
    format!(
        "#{:02x}{:02x}{:02x}",
        to_u8(srgba.0),
        to_u8(srgba.1),
        to_u8(srgba.2)
    )
}

fn css_style(palette: &ColorPalette, style: &Style) -> String {
    let (fg, bg) = if style.reverse {
        (style.background, style.foreground)
    } else {
        (style.foreground, style.background)
    };
    let mut css = format!("color:{};", css_color(palette, fg, !style.reverse));
    if bg != ColorAttribute::Default || style.reverse {
        let _ = write!(css, "background-color:{};", css_color(palette, bg, style.reverse));
    }
    match style.intensity {
        Intensity::Bold => css.push_str("font-weight:bold;"),
        Intensity::Half => css.push_str("opacity:0.7;"),
        Intensity::Normal => {}
    }
    if style.italic {
        css.push_str("font-style:italic;");
    }
    match (style.underline, style.strikethrough) {
        (true, true) => css.push_str("text-decoration:underline line-through;"),
        (true, false) => css.push_str("text-decoration:underline;"),
        (false, true) => css.push_str("text-decoration:line-through;"),
        (false, false) => {}
    }
    css
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
