use std::fmt::Display;

/// Key into the embedding vocabulary
///
/// Title tokens are rendered as `"{title}^{year}T"`; anything that does not
/// carry that suffix is an actor name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Actor(String),
    Title { title: String, year: i32 },
}

/// Marker closing every title token
const TITLE_MARKER: char = 'T';
const YEAR_SEPARATOR: char = '^';

impl Token {
    pub fn actor(name: impl Into<String>) -> Self {
        Token::Actor(name.into())
    }

    pub fn title(title: impl Into<String>, year: i32) -> Self {
        Token::Title {
            title: title.into(),
            year,
        }
    }

    /// Parses a raw vocabulary key back into a token
    pub fn parse(raw: &str) -> Self {
        match parse_title(raw) {
            Some((title, year)) => Token::title(title, year),
            None => Token::actor(raw),
        }
    }

    pub fn is_title(&self) -> bool {
        matches!(self, Token::Title { .. })
    }

    /// Returns `(title, year)` for title tokens
    pub fn as_title(&self) -> Option<(&str, i32)> {
        match self {
            Token::Title { title, year } => Some((title.as_str(), *year)),
            Token::Actor(_) => None,
        }
    }
}

fn parse_title(raw: &str) -> Option<(&str, i32)> {
    let body = raw.strip_suffix(TITLE_MARKER)?;
    let (title, year) = body.rsplit_once(YEAR_SEPARATOR)?;
    if title.is_empty() || year.is_empty() || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((title, year.parse().ok()?))
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Actor(name) => write!(f, "{}", name),
            Token::Title { title, year } => {
                write!(f, "{}{}{}{}", title, YEAR_SEPARATOR, year, TITLE_MARKER)
            }
        }
    }
}
