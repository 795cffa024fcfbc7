use error_chain::error_chain;

error_chain! {
    foreign_links {
        HttpRequest(reqwest::Error);
        Url(url::ParseError);
        Json(serde_json::Error);
    }

    errors {
        ColorOutOfRange(c: String) {
            description("color out of range"),
            display("\"{}\" is not in the valid range of colors (0 to 16777215, or 000000 to FFFFFF)", c),
        }
        InvalidColor(c: String) {
            description("invalid hex color"),
            display("\"{}\" is not a hexadecimal color", c),
        }
        InvalidTimestamp(t: String) {
            description("invalid timestamp"),
            display("cannot convert {} to a UTC timestamp", t),
        }
        IndexOutOfRange(index: usize, len: usize) {
            description("index out of range"),
            display("index {} is out of range for a list of length {}", index, len),
        }
        InvalidComponentType(t: i64) {
            description("invalid component type"),
            display("component type {} is invalid, a valid component type is an integer between 1 and 8", t),
        }
        InvalidButtonStyle(s: i64) {
            description("invalid button style"),
            display("button style {} is invalid, a valid button style is an integer between 1 and 5", s),
        }
        MissingCustomId {
            description("missing custom_id"),
            display("custom_id needs to be provided for non-link buttons"),
        }
        MissingUrl {
            description("missing url"),
            display("url needs to be provided for link buttons"),
        }
        LabelTooLong(len: usize) {
            description("label too long"),
            display("the label can be a maximum of 80 characters long, got {}", len),
        }
        CustomIdTooLong(len: usize) {
            description("custom_id too long"),
            display("custom_id can be a maximum of 100 characters, got {}", len),
        }
        NestedActionRow {
            description("nested action row"),
            display("an action row can't contain another action row"),
        }
        TooManyButtons {
            description("too many buttons"),
            display("an action row can contain up to 5 buttons"),
        }
        MissingMessageId {
            description("missing message id"),
            display("the message has no id, send it with wait=true before editing or deleting"),
        }
        MissingWebhookUrl {
            description("missing webhook url"),
            display("the message has no webhook url"),
        }
        InvalidArgument(reason: String) {
            description("invalid argument"),
            display("invalid argument: {}", reason),
        }
        Timeout(url: String) {
            description("request timed out"),
            display("request to {} timed out", url),
        }
        RateLimitedWithoutVia(url: String) {
            description("rate limited without a via header"),
            display("{} answered 429 without a Via header", url),
        }
    }
}

impl Error {
    /// Raised at construction or mutation time by the message models.
    pub fn is_validation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ColorOutOfRange(_)
                | ErrorKind::InvalidColor(_)
                | ErrorKind::InvalidTimestamp(_)
                | ErrorKind::IndexOutOfRange(..)
                | ErrorKind::InvalidComponentType(_)
                | ErrorKind::InvalidButtonStyle(_)
                | ErrorKind::MissingCustomId
                | ErrorKind::MissingUrl
                | ErrorKind::LabelTooLong(_)
                | ErrorKind::CustomIdTooLong(_)
                | ErrorKind::NestedActionRow
                | ErrorKind::TooManyButtons
        )
    }

    /// Raised before any network call when an edit or delete can't be routed.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MissingMessageId | ErrorKind::MissingWebhookUrl
        )
    }

    pub fn is_timeout(&self) -> bool {
        match self.kind() {
            ErrorKind::Timeout(_) => true,
            ErrorKind::HttpRequest(err) => err.is_timeout(),
            _ => false,
        }
    }
}

/// Converts a transport failure, keeping timeouts apart from other errors.
pub(crate) fn transport_error(url: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        ErrorKind::Timeout(url.to_owned()).into()
    } else {
        ErrorKind::HttpRequest(err).into()
    }
}
