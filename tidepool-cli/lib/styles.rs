use clap::builder::styling::{AnsiColor, Effects, Style, Styles};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Renders text in the styles used by the `tidepool` help output.
pub trait AnsiStyles {
    /// Styles the text like a section header.
    fn header(&self) -> String;

    /// Styles the text like a literal such as a command or a value.
    fn literal(&self) -> String;

    /// Styles the text like a placeholder.
    fn placeholder(&self) -> String;

    /// Styles the text like an error.
    fn error(&self) -> String;
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The styles of the `tidepool` help output.
pub fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
        .valid(AnsiColor::Green.on_default())
        .invalid(AnsiColor::Red.on_default())
}

fn paint(style: &Style, text: &str) -> String {
    if console::colors_enabled() {
        format!("{}{}{}", style.render(), text, style.render_reset())
    } else {
        text.to_string()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<T: AsRef<str> + ?Sized> AnsiStyles for T {
    fn header(&self) -> String {
        paint(styles().get_header(), self.as_ref())
    }

    fn literal(&self) -> String {
        paint(styles().get_literal(), self.as_ref())
    }

    fn placeholder(&self) -> String {
        paint(styles().get_placeholder(), self.as_ref())
    }

    fn error(&self) -> String {
        paint(styles().get_error(), self.as_ref())
    }
}
