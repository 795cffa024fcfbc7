use std::num::IntErrorKind;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use error_chain::bail;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::*;

pub const MAX_COLOR: i64 = 0xFFFFFF;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// A color given either as a number or as a hexadecimal string such as `"03b2f8"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Color {
    Int(i64),
    Hex(String),
}

impl Color {
    fn resolve(&self) -> Result<u32> {
        let value = match self {
            Self::Int(v) => *v,
            Self::Hex(s) => {
                let digits = s.trim_start_matches('#');
                let digits = digits
                    .strip_prefix("0x")
                    .or_else(|| digits.strip_prefix("0X"))
                    .unwrap_or(digits);
                match i64::from_str_radix(digits, 16) {
                    Ok(v) => v,
                    Err(e) => match e.kind() {
                        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                            bail!(ErrorKind::ColorOutOfRange(s.clone()))
                        }
                        _ => bail!(ErrorKind::InvalidColor(s.clone())),
                    },
                }
            }
        };

        if !(0..=MAX_COLOR).contains(&value) {
            let shown = match self {
                Self::Int(v) => v.to_string(),
                Self::Hex(s) => s.clone(),
            };
            bail!(ErrorKind::ColorOutOfRange(shown));
        }
        Ok(value as u32)
    }
}

impl From<i64> for Color {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Color {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u32> for Color {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<&str> for Color {
    fn from(v: &str) -> Self {
        Self::Hex(v.to_owned())
    }
}

impl From<String> for Color {
    fn from(v: String) -> Self {
        Self::Hex(v)
    }
}

/// Anything `set_timestamp` can normalize to a naive UTC ISO-8601 string.
#[derive(Debug, Clone, PartialEq)]
pub enum Timestamp {
    /// Seconds since the Unix epoch, fractions allowed.
    Epoch(f64),
    Text(String),
    DateTime(DateTime<Utc>),
}

impl Timestamp {
    fn to_utc(&self) -> Result<DateTime<Utc>> {
        match self {
            Self::Epoch(secs) => {
                if !secs.is_finite() {
                    bail!(ErrorKind::InvalidTimestamp(secs.to_string()));
                }
                let micros = (secs * 1_000_000.0).round() as i64;
                DateTime::<Utc>::from_timestamp(
                    micros.div_euclid(1_000_000),
                    (micros.rem_euclid(1_000_000) * 1_000) as u32,
                )
                .ok_or_else(|| ErrorKind::InvalidTimestamp(secs.to_string()).into())
            }
            Self::Text(s) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Ok(dt.with_timezone(&Utc));
                }
                NAIVE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                    .map(|naive| Utc.from_utc_datetime(&naive))
                    .ok_or_else(|| ErrorKind::InvalidTimestamp(s.clone()).into())
            }
            Self::DateTime(dt) => Ok(*dt),
        }
    }
}

impl From<f64> for Timestamp {
    fn from(v: f64) -> Self {
        Self::Epoch(v)
    }
}

impl From<i64> for Timestamp {
    fn from(v: i64) -> Self {
        Self::Epoch(v as f64)
    }
}

impl From<i32> for Timestamp {
    fn from(v: i32) -> Self {
        Self::Epoch(v.into())
    }
}

impl From<&str> for Timestamp {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Timestamp {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Timestamp {
    fn from(v: DateTime<Tz>) -> Self {
        Self::DateTime(v.with_timezone(&Utc))
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(Utc.from_utc_datetime(&v))
    }
}

fn deserialize_color<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer)?
        .map(|v| Color::Int(v).resolve())
        .transpose()
        .map_err(serde::de::Error::custom)
}

fn format_utc(dt: &DateTime<Utc>) -> String {
    let naive = dt.naive_utc();
    if dt.timestamp_subsec_nanos() == 0 {
        naive.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        naive.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_icon_url: Option<String>,
}

impl EmbedFooter {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Used for both the embed image and its thumbnail.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct EmbedMedia {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

impl EmbedMedia {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct EmbedVideo {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct EmbedProvider {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_icon_url: Option<String>,
}

impl EmbedAuthor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Rich content block attached to a webhook message.
///
/// Every setter only touches the embed itself. The color is kept private and
/// goes through the same `0..=0xFFFFFF` check whether it comes from
/// [`DiscordEmbed::set_color`] or from deserialized JSON.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DiscordEmbed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_color"
    )]
    color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<EmbedVideo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<EmbedProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField>,
}

impl DiscordEmbed {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            description: Some(description.into()),
            ..Default::default()
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = Some(url.into());
    }

    pub fn color(&self) -> Option<u32> {
        self.color
    }

    /// Sets the color from an integer or a 6 digit hex string.
    ///
    /// On error the previous color is kept.
    pub fn set_color(&mut self, color: impl Into<Color>) -> Result<()> {
        self.color = Some(color.into().resolve()?);
        Ok(())
    }

    /// Stores the timestamp as naive UTC, whatever offset the input carried.
    pub fn set_timestamp(&mut self, timestamp: impl Into<Timestamp>) -> Result<()> {
        let utc = timestamp.into().to_utc()?;
        self.timestamp = Some(format_utc(&utc));
        Ok(())
    }

    pub fn set_timestamp_now(&mut self) {
        self.timestamp = Some(format_utc(&Utc::now()));
    }

    pub fn set_footer(&mut self, footer: EmbedFooter) {
        self.footer = Some(footer);
    }

    pub fn set_image(&mut self, image: EmbedMedia) {
        self.image = Some(image);
    }

    pub fn set_thumbnail(&mut self, thumbnail: EmbedMedia) {
        self.thumbnail = Some(thumbnail);
    }

    pub fn set_video(&mut self, video: EmbedVideo) {
        self.video = Some(video);
    }

    pub fn set_provider(&mut self, provider: EmbedProvider) {
        self.provider = Some(provider);
    }

    pub fn set_author(&mut self, author: EmbedAuthor) {
        self.author = Some(author);
    }

    /// Appends an inline field.
    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.add_field_with_inline(name, value, true);
    }

    pub fn add_field_with_inline(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        inline: bool,
    ) {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
    }

    pub fn remove_field(&mut self, index: usize) -> Result<EmbedField> {
        if index >= self.fields.len() {
            bail!(ErrorKind::IndexOutOfRange(index, self.fields.len()));
        }
        Ok(self.fields.remove(index))
    }

    pub fn fields(&self) -> &[EmbedField] {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};

    #[test]
    fn test_set_color_from_hex_string() {
        let mut embed = DiscordEmbed::default();
        embed.set_color("03b2f8").unwrap();
        assert_eq!(embed.color(), Some(242424));

        embed.set_color("#FFFFFF").unwrap();
        assert_eq!(embed.color(), Some(16777215));
    }

    #[test]
    fn test_set_color_from_integer() {
        let mut embed = DiscordEmbed::default();
        embed.set_color(333333).unwrap();
        assert_eq!(embed.color(), Some(333333));

        embed.set_color(0).unwrap();
        assert_eq!(embed.color(), Some(0));
    }

    #[test]
    fn test_set_color_out_of_range() {
        let mut embed = DiscordEmbed::default();
        embed.set_color(242424).unwrap();

        let err = embed.set_color(9_999_999_999i64).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ColorOutOfRange(_)));
        assert!(err.is_validation());

        assert!(embed.set_color(16_777_216i64).is_err());
        assert!(embed.set_color(-1).is_err());
        assert!(embed.set_color("1000000").is_err());
        assert!(embed.set_color("ffffffffffffffffffffff").is_err());

        // A failed call keeps the previous color
        assert_eq!(embed.color(), Some(242424));
    }

    #[test]
    fn test_deserialized_color_is_range_checked() {
        let embed: DiscordEmbed =
            serde_json::from_str(r#"{"title": "t", "color": 242424}"#).unwrap();
        assert_eq!(embed.color(), Some(242424));

        let embed: DiscordEmbed = serde_json::from_str(r#"{"title": "t"}"#).unwrap();
        assert_eq!(embed.color(), None);

        assert!(serde_json::from_str::<DiscordEmbed>(r#"{"color": 4294967295}"#).is_err());
        assert!(serde_json::from_str::<DiscordEmbed>(r#"{"color": -1}"#).is_err());
    }

    #[test]
    fn test_set_color_invalid_hex() {
        let mut embed = DiscordEmbed::default();
        let err = embed.set_color("not a color").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidColor(_)));
    }

    #[test]
    fn test_set_timestamp_variants() {
        let expected = "2023-03-23T22:35:26";
        let inputs: Vec<Timestamp> = vec![
            1679610926i64.into(),
            1679610926.0f64.into(),
            "2023-03-23T22:35:26".into(),
            "2023-03-23 22:35:26".into(),
            "2023-03-23T23:35:26+01:00".into(),
            NaiveDate::from_ymd_opt(2023, 3, 23)
                .unwrap()
                .and_hms_opt(22, 35, 26)
                .unwrap()
                .into(),
            FixedOffset::east_opt(3600)
                .unwrap()
                .with_ymd_and_hms(2023, 3, 23, 23, 35, 26)
                .unwrap()
                .into(),
        ];

        for input in inputs {
            let mut embed = DiscordEmbed::default();
            embed.set_timestamp(input.clone()).unwrap();
            assert_eq!(embed.timestamp.as_deref(), Some(expected), "{:?}", input);
        }
    }

    #[test]
    fn test_set_timestamp_fractional_epoch() {
        let mut embed = DiscordEmbed::default();
        embed.set_timestamp(1679610926.5).unwrap();
        assert_eq!(
            embed.timestamp.as_deref(),
            Some("2023-03-23T22:35:26.500000")
        );
    }

    #[test]
    fn test_set_timestamp_rejects_garbage() {
        let mut embed = DiscordEmbed::default();
        let err = embed.set_timestamp("yesterday").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidTimestamp(_)));
        assert!(embed.timestamp.is_none());
    }

    #[test]
    fn test_set_timestamp_now_is_naive_utc() {
        let mut embed = DiscordEmbed::default();
        embed.set_timestamp_now();
        let ts = embed.timestamp.unwrap();
        assert!(!ts.ends_with('Z'));
        assert!(!ts.contains('+'));
        assert!(NaiveDateTime::parse_from_str(&ts, "%Y-%m-%dT%H:%M:%S%.f").is_ok());
    }

    #[test]
    fn test_fields_are_ordered_and_inline_by_default() {
        let mut embed = DiscordEmbed::default();
        assert!(embed.fields().is_empty());

        embed.add_field("Market", "Election");
        embed.add_field_with_inline("Side", "YES", false);
        embed.add_field("Price", "$0.65");

        let fields = embed.fields();
        assert_eq!(fields.len(), 3);
        assert_eq!(
            fields[0],
            EmbedField {
                name: "Market".to_string(),
                value: "Election".to_string(),
                inline: true,
            }
        );
        assert!(!fields[1].inline);
        assert_eq!(fields[2].name, "Price");
    }

    #[test]
    fn test_remove_field() {
        let mut embed = DiscordEmbed::default();
        embed.add_field("a", "1");
        embed.add_field("b", "2");

        let removed = embed.remove_field(0).unwrap();
        assert_eq!(removed.name, "a");
        assert_eq!(embed.fields().len(), 1);

        let err = embed.remove_field(5).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::IndexOutOfRange(5, 1)));
    }

    #[test]
    fn test_embed_serialization() {
        let mut embed = DiscordEmbed::new("Title", "Description");
        embed.set_color("33ccff").unwrap();
        embed.set_footer(EmbedFooter {
            text: "footer text".to_string(),
            icon_url: Some("footer icon url".to_string()),
            proxy_icon_url: Some("proxied footer icon url".to_string()),
        });
        embed.set_image(EmbedMedia {
            url: "image url".to_string(),
            proxy_url: Some("image proxy url".to_string()),
            height: Some(500),
            width: Some(500),
        });
        embed.set_video(EmbedVideo {
            url: "video url".to_string(),
            height: Some(500),
            width: None,
        });
        embed.set_provider(EmbedProvider {
            name: Some("provider".to_string()),
            url: None,
        });
        embed.set_author(EmbedAuthor::new("author"));
        embed.add_field("name", "value");

        let value = serde_json::to_value(&embed).unwrap();
        assert_eq!(value["title"], "Title");
        assert_eq!(value["color"], 3394815);
        assert_eq!(value["footer"]["proxy_icon_url"], "proxied footer icon url");
        assert_eq!(value["image"]["height"], 500);
        assert!(value["video"].get("width").is_none());
        assert_eq!(value["provider"]["name"], "provider");
        assert_eq!(value["author"]["name"], "author");
        assert_eq!(value["fields"][0]["inline"], true);
        assert!(value.get("thumbnail").is_none());
        assert!(value.get("timestamp").is_none());
    }

    #[test]
    fn test_empty_embed_serializes_to_empty_object() {
        let json = serde_json::to_string(&DiscordEmbed::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
