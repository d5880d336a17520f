//! Where the card server lives. Set `CARD_SERVER_HOST`, `CARD_SERVER_PORT` and
//! `CARD_SERVER_SECURE` when building to point the app somewhere other than a local dev server.

const fn or_default(value: Option<&'static str>, default: &'static str) -> &'static str {
    match value {
        Some(value) => value,
        None => default,
    }
}

const HOST: &str = or_default(option_env!("CARD_SERVER_HOST"), "127.0.0.1");

const PORT: u16 = const_str::parse!(or_default(option_env!("CARD_SERVER_PORT"), "8000"), u16);

const TLS: bool = match option_env!("CARD_SERVER_SECURE") {
    Some(flag) => const_str::equal!(flag, "1") || const_str::eq_ignore_ascii_case!(flag, "true"),
    None => false,
};

const SCHEME: &str = if TLS { "https" } else { "http" };

/// Card server this build talks to unless told otherwise
pub const SERVER_HTTP_URL: &str = const_str::concat!(SCHEME, "://", HOST, ":", PORT);

/// Routes of the card server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `GET ?lat&lon&acc`, answers with a card
    Card,
    /// `GET`, 200 while the server is up
    Health,
}

impl Endpoint {
    const fn path(self) -> &'static str {
        match self {
            Self::Card => "/v1/card",
            Self::Health => "/health",
        }
    }

    /// Absolute URL of this route on the server at `base_url`
    pub fn on(self, base_url: &str) -> String {
        let mut url = base_url.trim_end_matches('/').to_string();
        url.push_str(self.path());
        url
    }
}
