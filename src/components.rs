use error_chain::bail;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::errors::*;

pub const MAX_LABEL_LENGTH: usize = 80;
pub const MAX_CUSTOM_ID_LENGTH: usize = 100;
pub const MAX_BUTTONS_PER_ROW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize_repr, Serialize_repr)]
#[repr(u8)]
pub enum ComponentType {
    ActionRow = 1,
    Button = 2,
    StringSelect = 3,
    TextInput = 4,
    UserSelect = 5,
    RoleSelect = 6,
    MentionableSelect = 7,
    ChannelSelect = 8,
}

impl TryFrom<i64> for ComponentType {
    type Error = Error;

    fn try_from(v: i64) -> Result<Self> {
        Ok(match v {
            1 => Self::ActionRow,
            2 => Self::Button,
            3 => Self::StringSelect,
            4 => Self::TextInput,
            5 => Self::UserSelect,
            6 => Self::RoleSelect,
            7 => Self::MentionableSelect,
            8 => Self::ChannelSelect,
            _ => bail!(ErrorKind::InvalidComponentType(v)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize_repr, Serialize_repr)]
#[repr(u8)]
pub enum ButtonStyle {
    Primary = 1,
    Secondary = 2,
    Success = 3,
    Danger = 4,
    Link = 5,
}

impl ButtonStyle {
    /// Every style except `Link` reports clicks through a `custom_id`.
    pub fn needs_custom_id(self) -> bool {
        !matches!(self, Self::Link)
    }
}

impl TryFrom<i64> for ButtonStyle {
    type Error = Error;

    fn try_from(v: i64) -> Result<Self> {
        Ok(match v {
            1 => Self::Primary,
            2 => Self::Secondary,
            3 => Self::Success,
            4 => Self::Danger,
            5 => Self::Link,
            _ => bail!(ErrorKind::InvalidButtonStyle(v)),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PartialEmoji {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub animated: bool,
}

/// Optional parts of a button, validated together by [`Button::new`].
#[derive(Debug, Clone, Default)]
pub struct ButtonOptions {
    pub custom_id: Option<String>,
    pub label: Option<String>,
    pub url: Option<String>,
    pub emoji: Option<PartialEmoji>,
    pub disabled: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Button {
    #[serde(rename = "type")]
    kind: ComponentType,
    style: ButtonStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    emoji: Option<PartialEmoji>,
    disabled: bool,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

impl Button {
    pub fn new(style: ButtonStyle, options: ButtonOptions) -> Result<Self> {
        let custom_id = non_empty(options.custom_id);
        let url = non_empty(options.url);

        if style.needs_custom_id() && custom_id.is_none() {
            bail!(ErrorKind::MissingCustomId);
        }
        if style == ButtonStyle::Link && url.is_none() {
            bail!(ErrorKind::MissingUrl);
        }
        if let Some(label) = &options.label {
            let len = label.chars().count();
            if len > MAX_LABEL_LENGTH {
                bail!(ErrorKind::LabelTooLong(len));
            }
        }
        if let Some(custom_id) = &custom_id {
            let len = custom_id.chars().count();
            if len > MAX_CUSTOM_ID_LENGTH {
                bail!(ErrorKind::CustomIdTooLong(len));
            }
        }

        Ok(Self {
            kind: ComponentType::Button,
            style,
            custom_id,
            label: options.label,
            url,
            emoji: options.emoji,
            disabled: options.disabled,
        })
    }

    pub fn style(&self) -> ButtonStyle {
        self.style
    }

    pub fn custom_id(&self) -> Option<&str> {
        self.custom_id.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

/// Anything that can sit in an action row.
///
/// `Raw` carries components this crate has no model for (select menus and
/// the like); its `type` is checked when it is built.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Component {
    ActionRow(ActionRow),
    Button(Button),
    Raw(Map<String, Value>),
}

impl Component {
    pub fn raw(map: Map<String, Value>) -> Result<Self> {
        let kind = map.get("type").and_then(Value::as_i64).unwrap_or(0);
        ComponentType::try_from(kind)?;
        Ok(Self::Raw(map))
    }

    pub fn kind(&self) -> ComponentType {
        match self {
            Self::ActionRow(_) => ComponentType::ActionRow,
            Self::Button(_) => ComponentType::Button,
            Self::Raw(map) => map
                .get("type")
                .and_then(Value::as_i64)
                .and_then(|t| ComponentType::try_from(t).ok())
                .unwrap_or(ComponentType::ActionRow),
        }
    }
}

impl From<Button> for Component {
    fn from(b: Button) -> Self {
        Self::Button(b)
    }
}

impl From<ActionRow> for Component {
    fn from(r: ActionRow) -> Self {
        Self::ActionRow(r)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ActionRow {
    #[serde(rename = "type")]
    kind: ComponentType,
    components: Vec<Component>,
}

impl Default for ActionRow {
    fn default() -> Self {
        Self {
            kind: ComponentType::ActionRow,
            components: Vec::new(),
        }
    }
}

impl ActionRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a row by adding each component in turn.
    pub fn with_components<I, C>(components: I) -> Result<Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<Component>,
    {
        let mut row = Self::new();
        for component in components {
            row.add_component(component)?;
        }
        Ok(row)
    }

    /// Appends a component, leaving the row untouched on error.
    pub fn add_component(&mut self, component: impl Into<Component>) -> Result<()> {
        let component = component.into();
        match component.kind() {
            ComponentType::ActionRow => bail!(ErrorKind::NestedActionRow),
            ComponentType::Button if self.button_count() >= MAX_BUTTONS_PER_ROW => {
                bail!(ErrorKind::TooManyButtons)
            }
            _ => {}
        }
        self.components.push(component);
        Ok(())
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    fn button_count(&self) -> usize {
        self.components
            .iter()
            .filter(|c| c.kind() == ComponentType::Button)
            .count()
    }
}
