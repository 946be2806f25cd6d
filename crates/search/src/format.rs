use answerbot_slack::blocks::{markdown_block, Block, MessageBuilder};

use crate::types::{SummarizerSearchApiResponse, SummaryContext};

pub const CONTEXT_HEADER: &str = "Context";
/// Slack rejects header blocks with empty text.
pub const UNTITLED_HEADER: &str = "Summary";

/// Slack mrkdwn marks bold with single asterisks.
pub fn convert_bold(content: &str) -> String {
    content.replace("**", "*")
}

/// Renders a summary as: title header, one section per fragment, divider, then
/// a `Context` header and one link section per source when sources exist.
/// An empty summary renders nothing.
pub fn to_blocks(response: &SummarizerSearchApiResponse) -> Vec<Block> {
    if response.summary.is_empty() {
        return Vec::new();
    }

    let title = match response.title.trim() {
        "" => UNTITLED_HEADER,
        title => title,
    };
    let mut blocks = MessageBuilder::new()
        .header(title)
        .markdown_sections(response.summary.iter().map(|fragment| convert_bold(&fragment.text())))
        .divider()
        .build();

    if !response.enrichments.context.is_empty() {
        blocks.extend(context_section(&response.enrichments.context));
    }
    blocks
}

pub fn context_section(contexts: &[SummaryContext]) -> Vec<Block> {
    MessageBuilder::new()
        .header(CONTEXT_HEADER)
        .build()
        .into_iter()
        .chain(contexts.iter().map(|context| {
            markdown_block(format!("<{}|{}>", context.url, context.title), None)
        }))
        .collect()
}
