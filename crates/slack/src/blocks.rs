use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Accessory {
    Image { image_url: String, alt_text: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header {
        text: TextObject,
    },
    Section {
        text: TextObject,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accessory: Option<Accessory>,
    },
    Divider,
}

/// A single markdown section, optionally with an image on the right.
pub fn markdown_block(content: impl Into<String>, image_url: Option<&str>) -> Block {
    Block::Section {
        text: TextObject::mrkdwn(content),
        accessory: image_url.map(|url| Accessory::Image {
            image_url: url.to_owned(),
            alt_text: String::new(),
        }),
    }
}

#[derive(Default)]
pub struct MessageBuilder {
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Header { text: TextObject::plain(text) });
        self
    }

    pub fn markdown(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(markdown_block(text, None));
        self
    }

    pub fn markdown_sections<I, S>(mut self, sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocks.extend(sections.into_iter().map(|text| markdown_block(text, None)));
        self
    }

    pub fn divider(mut self) -> Self {
        self.blocks.push(Block::Divider);
        self
    }

    pub fn build(self) -> Vec<Block> {
        self.blocks
    }
}
