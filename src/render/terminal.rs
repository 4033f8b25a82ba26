use std::{
    io::{self, Write},
    ops::Range,
};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{
        disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen,
    },
};

use super::highlight::{Emphasis, SentenceMark};
use crate::story::Sentence;

const HIGHLIGHT_COLOR: Color = Color::White;
const DIM_COLOR: Color = Color::DarkGrey;
const CHROME_COLOR: Color = Color::Cyan;
/// Lines kept above the highlighted partition when the text is scrolled.
const CONTEXT_LINES: usize = 1;

/// Raw mode plus alternate screen, undone on drop.
pub struct TerminalSession {
    _private: (),
}

impl TerminalSession {
    pub fn new() -> io::Result<Self> {
        enable_raw_mode()?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen, Hide) {
            let _ = disable_raw_mode();
            return Err(e);
        }
        Ok(Self { _private: () })
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), Show, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

/// Everything one frame shows.
#[derive(Debug, Clone, Copy)]
pub struct Screen<'a> {
    pub title: &'a str,
    pub sentences: &'a [Sentence],
    pub marks: &'a [SentenceMark],
    /// `(story number, total stories)`
    pub progress: Option<(usize, usize)>,
    /// Label of the music indicator, if shown.
    pub music: Option<&'a str>,
    pub complete: bool,
    pub notice: Option<&'a str>,
    pub width: u16,
    pub height: u16,
}

/// Redraw the whole screen. Raw mode needs explicit `\r\n` line breaks.
///
/// Text taller than the screen is shown through a window that keeps the
/// highlighted partition visible.
pub fn paint<W: Write>(out: &mut W, screen: &Screen<'_>) -> io::Result<()> {
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;

    queue!(
        out,
        SetAttribute(Attribute::Bold),
        Print(screen.title),
        SetAttribute(Attribute::Reset),
        Print("\r\n")
    )?;
    let mut chrome = Vec::new();
    if let Some((n, total)) = screen.progress {
        chrome.push(format!("Story {n} of {total}"));
    }
    if let Some(label) = screen.music {
        chrome.push(format!("\u{266B} {label}"));
    }
    if !chrome.is_empty() {
        queue!(
            out,
            SetForegroundColor(CHROME_COLOR),
            Print(chrome.join("   ")),
            ResetColor,
            Print("\r\n")
        )?;
    }
    queue!(out, Print("\r\n"))?;

    let header_rows = if chrome.is_empty() { 2 } else { 3 };
    let footer_rows = if screen.notice.is_some() { 3 } else { 2 };
    let text_rows = (screen.height as usize).saturating_sub(header_rows + footer_rows);
    let lines = wrap(screen.sentences, screen.marks, screen.width.max(20) as usize);
    let window = viewport(&lines, text_rows);

    for line in &lines[window] {
        for (emphasis, text) in line {
            match *emphasis {
                Emphasis::Highlighted => queue!(
                    out,
                    SetForegroundColor(HIGHLIGHT_COLOR),
                    SetAttribute(Attribute::Bold),
                    Print(text),
                    SetAttribute(Attribute::Reset)
                )?,
                Emphasis::Dimmed => queue!(out, SetForegroundColor(DIM_COLOR), Print(text))?,
            }
        }
        queue!(out, ResetColor, Print("\r\n"))?;
    }

    queue!(out, Print("\r\n"))?;
    if let Some(notice) = screen.notice {
        queue!(out, SetForegroundColor(Color::Yellow), Print(notice), ResetColor, Print("\r\n"))?;
    }
    let footer = if screen.complete {
        "The story is complete. Press ENTER to continue."
    } else {
        "Press SPACE or \u{2192} to continue    ESC to quit"
    };
    queue!(out, SetForegroundColor(CHROME_COLOR), Print(footer), ResetColor)?;
    out.flush()
}

type Line = Vec<(Emphasis, String)>;

fn is_highlighted(line: &Line) -> bool {
    line.iter().any(|(e, _)| *e == Emphasis::Highlighted)
}

/// Range of `lines` to show in `rows` rows: everything if it fits, otherwise
/// a window starting just above the first highlighted line and, when the
/// partition fits, reaching its last line.
fn viewport(lines: &[Line], rows: usize) -> Range<usize> {
    let rows = rows.max(1);
    if lines.len() <= rows {
        return 0..lines.len();
    }
    let start = match lines.iter().position(is_highlighted) {
        Some(first) => {
            let last = lines.iter().rposition(is_highlighted).unwrap_or(first);
            let mut start = first.saturating_sub(CONTEXT_LINES);
            if last >= start + rows {
                start = (last + 1 - rows).min(first);
            }
            start
        }
        None => 0,
    };
    let start = start.min(lines.len() - rows);
    start..start + rows
}

/// Greedy word wrap that keeps each word's emphasis. Runs of equal emphasis
/// on a line are merged.
fn wrap(sentences: &[Sentence], marks: &[SentenceMark], width: usize) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    let mut line: Line = Vec::new();
    let mut col = 0;

    for (sentence, mark) in sentences.iter().zip(marks) {
        for word in sentence.text.split_whitespace() {
            let len = word.chars().count();
            if col > 0 && col + 1 + len > width {
                lines.push(std::mem::take(&mut line));
                col = 0;
            }
            let piece = if col == 0 { word.to_string() } else { format!(" {word}") };
            col += piece.chars().count();
            match line.last_mut() {
                Some((e, text)) if *e == mark.emphasis => text.push_str(&piece),
                _ => line.push((mark.emphasis, piece)),
            }
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::highlight::mark_sentences;

    fn sentences() -> Vec<Sentence> {
        vec![
            Sentence::new(0, "The tent came down."),
            Sentence::new(1, "Rain started."),
            Sentence::new(2, "Nobody stayed."),
        ]
    }

    #[test]
    fn wrap_respects_width_and_keeps_emphasis() {
        let s = sentences();
        let marks = mark_sentences(&s, &[1]);
        let lines = wrap(&s, &marks, 24);
        for line in &lines {
            let width: usize = line.iter().map(|(_, t)| t.chars().count()).sum();
            assert!(width <= 24, "line too wide: {line:?}");
        }
        let highlighted: String = lines
            .iter()
            .flatten()
            .filter(|(e, _)| *e == Emphasis::Highlighted)
            .map(|(_, t)| t.trim().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(highlighted, "Rain started.");
    }

    #[test]
    fn paint_writes_title_text_and_footer() {
        let s = sentences();
        let marks = mark_sentences(&s, &[0]);
        let mut out = Vec::new();
        paint(
            &mut out,
            &Screen {
                title: "The Carnival Packed Away",
                sentences: &s,
                marks: &marks,
                progress: Some((1, 3)),
                music: Some("Music playing"),
                complete: false,
                notice: None,
                width: 80,
                height: 24,
            },
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("The Carnival Packed Away"));
        assert!(text.contains("Story 1 of 3"));
        assert!(text.contains("The tent came down."));
        assert!(text.contains("Press SPACE"));
        assert!(text.contains("Music playing"));
    }

    #[test]
    fn completed_screen_asks_to_continue() {
        let s = sentences();
        let marks = mark_sentences(&s, &[]);
        let mut out = Vec::new();
        paint(
            &mut out,
            &Screen {
                title: "t",
                sentences: &s,
                marks: &marks,
                progress: None,
                music: None,
                complete: true,
                notice: Some("Track missing"),
                width: 80,
                height: 24,
            },
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Press ENTER"));
        assert!(text.contains("Track missing"));
        assert!(!text.contains("Story 1"));
    }

    fn long_story() -> Vec<Sentence> {
        (0..60)
            .map(|id| Sentence::new(id, format!("Line{id}: the story goes on for a while so that it runs long.")))
            .collect()
    }

    fn paint_long(highlighted: &[i64], height: u16) -> String {
        let s = long_story();
        let marks = mark_sentences(&s, highlighted);
        let mut out = Vec::new();
        paint(
            &mut out,
            &Screen {
                title: "Long",
                sentences: &s,
                marks: &marks,
                progress: Some((2, 3)),
                music: Some("Music playing"),
                complete: false,
                notice: None,
                width: 80,
                height,
            },
        )
        .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn tall_text_fits_the_screen() {
        let text = paint_long(&[0, 1], 24);
        assert!(text.matches("\r\n").count() < 24, "frame taller than 24 rows");
        assert!(text.contains("Line0:"));
        assert!(text.contains("Line1:"));
        assert!(text.contains("Press SPACE"));
    }

    #[test]
    fn window_follows_the_highlighted_partition() {
        let text = paint_long(&[58, 59], 24);
        assert!(text.contains("Line58:"));
        assert!(text.contains("Line59:"));
        assert!(!text.contains("Line0:"));
        assert!(text.matches("\r\n").count() < 24);
    }

    #[test]
    fn viewport_keeps_one_line_of_context() {
        let s = long_story();
        let marks = mark_sentences(&s, &[30]);
        let lines = wrap(&s, &marks, 80);
        let first = lines.iter().position(is_highlighted).unwrap();
        let window = viewport(&lines, 10);
        assert_eq!(window.len(), 10);
        assert_eq!(window.start, first - 1);

        let short = viewport(&lines[..5], 10);
        assert_eq!(short, 0..5);
    }
}
