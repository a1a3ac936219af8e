//! Terminal rendering for answers
//!
//! Language model answers are usually markdown; this renders the common
//! constructs with colors instead of printing the raw markup.

use std::io::{self, Write};

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Render markdown to stdout, with colors when the terminal supports them
pub fn format_markdown(markdown: &str) -> io::Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    render_markdown(&mut stdout, markdown)?;
    stdout.reset()
}

/// Render markdown to any color-capable writer
pub fn render_markdown<W: WriteColor>(out: &mut W, markdown: &str) -> io::Result<()> {
    let mut renderer = Renderer::new(out);
    for event in Parser::new_ext(markdown, Options::all()) {
        renderer.handle_event(event)?;
    }
    Ok(())
}

struct Renderer<'a, W: WriteColor> {
    out: &'a mut W,
    styles: Vec<ColorSpec>,
    // One entry per open list: the next number for ordered lists, None for bullets
    lists: Vec<Option<u64>>,
}

impl<'a, W: WriteColor> Renderer<'a, W> {
    fn new(out: &'a mut W) -> Self {
        Self {
            out,
            styles: Vec::new(),
            lists: Vec::new(),
        }
    }

    fn handle_event(&mut self, event: Event) -> io::Result<()> {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag_end) => self.end(tag_end),
            Event::Text(text) => write!(self.out, "{}", text),
            Event::Code(code) => self.inline_code(&code),
            Event::SoftBreak | Event::HardBreak => writeln!(self.out),
            Event::Rule => writeln!(self.out, "{}", "─".repeat(40)),
            _ => Ok(()),
        }
    }

    fn start(&mut self, tag: Tag) -> io::Result<()> {
        match tag {
            Tag::Heading { level, .. } => {
                let color = match level {
                    HeadingLevel::H1 => Color::Rgb(255, 99, 71),
                    HeadingLevel::H2 => Color::Rgb(70, 130, 180),
                    _ => Color::Cyan,
                };
                let mut spec = ColorSpec::new();
                spec.set_fg(Some(color)).set_bold(true);
                self.push_style(spec)
            }
            Tag::Strong => {
                let mut spec = self.current_style();
                spec.set_bold(true);
                self.push_style(spec)
            }
            Tag::Emphasis => {
                let mut spec = self.current_style();
                spec.set_italic(true);
                self.push_style(spec)
            }
            Tag::BlockQuote(_) => {
                let mut spec = ColorSpec::new();
                spec.set_fg(Some(Color::Yellow));
                self.push_style(spec)?;
                write!(self.out, "  │ ")
            }
            Tag::CodeBlock(kind) => {
                let mut spec = ColorSpec::new();
                spec.set_fg(Some(Color::Green));
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        let mut lang_spec = ColorSpec::new();
                        lang_spec.set_fg(Some(Color::Blue)).set_italic(true);
                        self.out.set_color(&lang_spec)?;
                        writeln!(self.out, "[{}]", lang)?;
                    }
                }
                self.push_style(spec)
            }
            Tag::List(start) => {
                self.lists.push(start);
                Ok(())
            }
            Tag::Item => {
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                match self.lists.last_mut() {
                    Some(Some(number)) => {
                        write!(self.out, "{}{}. ", indent, number)?;
                        *number += 1;
                        Ok(())
                    }
                    _ => write!(self.out, "{}• ", indent),
                }
            }
            Tag::Link { .. } => {
                let mut spec = ColorSpec::new();
                spec.set_fg(Some(Color::Blue)).set_underline(true);
                self.push_style(spec)
            }
            _ => Ok(()),
        }
    }

    fn end(&mut self, tag_end: TagEnd) -> io::Result<()> {
        match tag_end {
            TagEnd::Heading(_) => {
                self.pop_style()?;
                writeln!(self.out)?;
                writeln!(self.out)
            }
            TagEnd::Paragraph => {
                writeln!(self.out)?;
                if self.lists.is_empty() {
                    writeln!(self.out)?;
                }
                Ok(())
            }
            TagEnd::Strong | TagEnd::Emphasis | TagEnd::Link => self.pop_style(),
            TagEnd::BlockQuote(_) | TagEnd::CodeBlock => {
                self.pop_style()?;
                writeln!(self.out)
            }
            TagEnd::List(_) => {
                self.lists.pop();
                if self.lists.is_empty() {
                    writeln!(self.out)?;
                }
                Ok(())
            }
            TagEnd::Item => writeln!(self.out),
            _ => Ok(()),
        }
    }

    fn inline_code(&mut self, code: &str) -> io::Result<()> {
        self.out
            .set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(self.out, "`{}`", code)?;
        let current = self.current_style();
        self.out.set_color(&current)
    }

    fn current_style(&self) -> ColorSpec {
        self.styles.last().cloned().unwrap_or_default()
    }

    fn push_style(&mut self, spec: ColorSpec) -> io::Result<()> {
        self.out.set_color(&spec)?;
        self.styles.push(spec);
        Ok(())
    }

    fn pop_style(&mut self) -> io::Result<()> {
        self.styles.pop();
        match self.styles.last() {
            Some(spec) => self.out.set_color(spec),
            None => self.out.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::Buffer;

    fn render(markdown: &str) -> String {
        let mut buffer = Buffer::no_color();
        render_markdown(&mut buffer, markdown).unwrap();
        String::from_utf8(buffer.into_inner()).unwrap()
    }

    #[test]
    fn test_plain_paragraph() {
        assert_eq!(render("The capital of Florin is X."), "The capital of Florin is X.\n\n");
    }

    #[test]
    fn test_markup_is_removed() {
        let output = render("# Answer\n\nThe capital is **X** and `x` in code.");

        assert!(output.starts_with("Answer\n"));
        assert!(output.contains("The capital is X and `x` in code."));
        assert!(!output.contains("**"));
        assert!(!output.contains('#'));
    }

    #[test]
    fn test_lists() {
        let bullets = render("- first\n- second\n");
        assert!(bullets.contains("• first\n"));
        assert!(bullets.contains("• second\n"));

        let numbered = render("1. one\n2. two\n");
        assert!(numbered.contains("1. one\n"));
        assert!(numbered.contains("2. two\n"));
    }

    #[test]
    fn test_fenced_code_shows_language() {
        let output = render("```rust\nfn main() {}\n```\n");

        assert!(output.contains("[rust]\n"));
        assert!(output.contains("fn main() {}"));
    }
}
