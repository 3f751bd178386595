//! Deterministic pod and container colors

use crossterm::Command;
use crossterm::style::{
    Attribute, Color, ContentStyle, SetAttributes, SetBackgroundColor, SetForegroundColor,
    SetUnderlineColor,
};

/// Resets every SGR attribute
pub const SGR_RESET: &str = "\x1b[0m";

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ColorError {
    #[error("pod-colors must not be empty")]
    EmptyPodColors,

    #[error("pod-colors and container-colors must have the same length")]
    LengthMismatch,

    #[error("invalid SGR sequence {0:?}")]
    InvalidSgr(String),
}

/// Pod and container style pairs, picked by hashing the pod name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    pairs: Vec<(ContentStyle, ContentStyle)>,
    enabled: bool,
}

impl Default for Palette {
    fn default() -> Self {
        let pair = |bright, dark| (fg(bright), fg(dark));
        Self {
            pairs: vec![
                pair(Color::Cyan, Color::DarkCyan),
                pair(Color::Green, Color::DarkGreen),
                pair(Color::Magenta, Color::DarkMagenta),
                pair(Color::Yellow, Color::DarkYellow),
                pair(Color::Blue, Color::DarkBlue),
                pair(Color::Red, Color::DarkRed),
            ],
            enabled: true,
        }
    }
}

impl Palette {
    /// Build a palette from SGR parameter strings such as `91`, `4;91` or
    /// `38;2;255;97;136`. Without container colors the pod colors are reused.
    pub fn from_sgr<S: AsRef<str>>(
        pod_colors: &[S],
        container_colors: &[S],
    ) -> Result<Self, ColorError> {
        if pod_colors.is_empty() {
            return Err(ColorError::EmptyPodColors);
        }
        let container_colors = if container_colors.is_empty() {
            pod_colors
        } else if container_colors.len() != pod_colors.len() {
            return Err(ColorError::LengthMismatch);
        } else {
            container_colors
        };

        let pairs = pod_colors
            .iter()
            .zip(container_colors)
            .map(|(pod, container)| Ok((parse_sgr(pod.as_ref())?, parse_sgr(container.as_ref())?)))
            .collect::<Result<Vec<_>, ColorError>>()?;

        Ok(Self {
            pairs,
            enabled: true,
        })
    }

    /// Turn all styling on or off
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Styles for a pod and its container
    ///
    /// With `diff_container` the container color comes from hashing the
    /// container name instead of the pod name.
    pub fn colors_for(
        &self,
        pod: &str,
        container: &str,
        diff_container: bool,
    ) -> (ContentStyle, ContentStyle) {
        if !self.enabled || self.pairs.is_empty() {
            return (ContentStyle::new(), ContentStyle::new());
        }
        let (pod_style, container_style) = self.pairs[self.index(pod)];
        if diff_container {
            (pod_style, self.pairs[self.index(container)].1)
        } else {
            (pod_style, container_style)
        }
    }

    /// Style for highlighted matches, red bold
    pub fn highlight(&self) -> ContentStyle {
        self.styled(Color::DarkRed)
    }

    /// Style for the `+` start marker
    pub fn start_marker(&self) -> ContentStyle {
        self.styled(Color::Green)
    }

    /// Style for the `-` stop marker
    pub fn stop_marker(&self) -> ContentStyle {
        self.styled(Color::Red)
    }

    fn styled(&self, color: Color) -> ContentStyle {
        if !self.enabled {
            return ContentStyle::new();
        }
        let mut style = fg(color);
        style.attributes.set(Attribute::Bold);
        style
    }

    fn index(&self, name: &str) -> usize {
        (fnv1_32(name.as_bytes()) % self.pairs.len() as u32) as usize
    }
}

fn fg(color: Color) -> ContentStyle {
    let mut style = ContentStyle::new();
    style.foreground_color = Some(color);
    style
}

/// FNV-1 (multiply then xor), 32 bit
fn fnv1_32(bytes: &[u8]) -> u32 {
    const OFFSET: u32 = 2_166_136_261;
    const PRIME: u32 = 16_777_619;
    bytes.iter().fold(OFFSET, |hash, b| {
        hash.wrapping_mul(PRIME) ^ u32::from(*b)
    })
}

const BASIC: [Color; 8] = [
    Color::Black,
    Color::DarkRed,
    Color::DarkGreen,
    Color::DarkYellow,
    Color::DarkBlue,
    Color::DarkMagenta,
    Color::DarkCyan,
    Color::Grey,
];

const BRIGHT: [Color; 8] = [
    Color::DarkGrey,
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
    Color::White,
];

/// Parse `;` separated SGR parameters into a style
fn parse_sgr(sequence: &str) -> Result<ContentStyle, ColorError> {
    let invalid = || ColorError::InvalidSgr(sequence.to_string());

    let codes = sequence
        .split(';')
        .map(|part| part.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;

    let mut style = ContentStyle::new();
    let mut codes = codes.into_iter();
    while let Some(code) = codes.next() {
        match code {
            0 => style = ContentStyle::new(),
            1 => style.attributes.set(Attribute::Bold),
            2 => style.attributes.set(Attribute::Dim),
            3 => style.attributes.set(Attribute::Italic),
            4 => style.attributes.set(Attribute::Underlined),
            5 => style.attributes.set(Attribute::SlowBlink),
            7 => style.attributes.set(Attribute::Reverse),
            9 => style.attributes.set(Attribute::CrossedOut),
            30..=37 => style.foreground_color = Some(BASIC[usize::from(code - 30)]),
            40..=47 => style.background_color = Some(BASIC[usize::from(code - 40)]),
            90..=97 => style.foreground_color = Some(BRIGHT[usize::from(code - 90)]),
            100..=107 => style.background_color = Some(BRIGHT[usize::from(code - 100)]),
            38 | 48 => {
                let color = extended_color(&mut codes).ok_or_else(invalid)?;
                if code == 38 {
                    style.foreground_color = Some(color);
                } else {
                    style.background_color = Some(color);
                }
            }
            _ => return Err(invalid()),
        }
    }
    Ok(style)
}

/// `5;n` for the 256 color table or `2;r;g;b` for true color
fn extended_color(codes: &mut impl Iterator<Item = u8>) -> Option<Color> {
    match codes.next()? {
        5 => Some(Color::AnsiValue(codes.next()?)),
        2 => Some(Color::Rgb {
            r: codes.next()?,
            g: codes.next()?,
            b: codes.next()?,
        }),
        _ => None,
    }
}

/// Escape sequence that switches the terminal to `style`
///
/// Empty for the plain style.
pub fn sgr_prefix(style: &ContentStyle) -> String {
    let mut out = String::new();
    // writing into a String cannot fail
    if let Some(color) = style.foreground_color {
        let _ = SetForegroundColor(color).write_ansi(&mut out);
    }
    if let Some(color) = style.background_color {
        let _ = SetBackgroundColor(color).write_ansi(&mut out);
    }
    if let Some(color) = style.underline_color {
        let _ = SetUnderlineColor(color).write_ansi(&mut out);
    }
    if !style.attributes.is_empty() {
        let _ = SetAttributes(style.attributes).write_ansi(&mut out);
    }
    out
}
