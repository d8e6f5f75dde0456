use std::fmt::Write as _;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::decision::gateway::DecisionService;
use crate::decision::types::{ActionKind, Decision, DecisionContext};
use crate::kernel::event::EventKind;
use crate::kernel::state::Emotion;

/// Longest utterance we hand to the voice.
pub const MAX_SPEECH_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = "You are the co-host of a live stream. The streamer plays; you \
watch, listen and react like a friend on the couch. The streamer always comes first. \
Keep it to one or two sentences and never backseat.\n\
Answer with exactly one line:\n\
SPEAK: <what you say>\n\
EMOTION: <neutral|happy|sad|excited|focused|surprised|thinking|confused|angry>\n\
THINK: <a note to yourself, not spoken>\n\
NOTHING\n\
A SPEAK line may be followed by one EMOTION line.";

/// `DecisionService` backed by a llama-server style `/completion` endpoint.
#[derive(Clone)]
pub struct LlmDecisionService {
    client: Client,
    base_url: String,
    n_predict: usize,
    temperature: f32,
}

#[derive(Serialize)]
struct CompletionRequest {
    prompt: String,
    stream: bool,
    n_predict: usize,
    temperature: f32,
    stop: Vec<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: String,
}

impl LlmDecisionService {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            n_predict: config.n_predict,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl DecisionService for LlmDecisionService {
    async fn decide(&self, context: &DecisionContext) -> Result<Decision> {
        let request_body = CompletionRequest {
            prompt: build_prompt(context),
            stream: false,
            n_predict: self.n_predict,
            temperature: self.temperature,
            stop: vec!["\nEvent:".to_string(), "\nSystem:".to_string()],
        };

        let response = self
            .client
            .post(format!("{}/completion", self.base_url))
            .json(&request_body)
            .send()
            .await
            .context("LLM request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("LLM Server Error: {}", response.status()));
        }

        let resp_json: CompletionResponse = response
            .json()
            .await
            .context("LLM response was not valid JSON")?;
        debug!("LLM answered {} chars", resp_json.content.len());
        Ok(parse_decision(&resp_json.content))
    }
}

fn build_prompt(context: &DecisionContext) -> String {
    let state = &context.state;
    let mut prompt = format!("System: {}\n\n", SYSTEM_PROMPT);

    let _ = writeln!(
        prompt,
        "You are {:?}, looking {}. Live for {}s.",
        state.activity,
        state.emotion,
        state.uptime_ms / 1000
    );
    if let Some(ms) = state.speaker_idle_ms {
        let _ = writeln!(prompt, "The streamer last spoke {}s ago.", ms / 1000);
    }
    if let Some(ms) = state.ai_idle_ms {
        let _ = writeln!(prompt, "You last acted {}s ago.", ms / 1000);
    }

    let recent: Vec<_> = state
        .recent_events
        .iter()
        .filter(|e| e.id != context.event.id && e.kind != EventKind::Tick)
        .collect();
    if !recent.is_empty() {
        prompt.push_str("\nRecently:\n");
        for event in recent {
            let _ = writeln!(prompt, "- {}", describe(event.kind, event.author.as_deref(), event.text.as_deref()));
        }
    }

    let said: Vec<_> = state
        .recent_actions
        .iter()
        .filter(|a| a.kind == ActionKind::Speak)
        .filter_map(|a| a.text.as_deref())
        .collect();
    if !said.is_empty() {
        prompt.push_str("\nYou said:\n");
        for line in said {
            let _ = writeln!(prompt, "- {}", line);
        }
    }

    let event = &context.event;
    let _ = write!(
        prompt,
        "\nEvent: {}\nAnswer:",
        describe(event.kind, event.author.as_deref(), event.text.as_deref())
    );
    prompt
}

fn describe(kind: EventKind, author: Option<&str>, text: Option<&str>) -> String {
    let text = text.unwrap_or("");
    match kind {
        EventKind::StreamerSpeech => format!("The streamer says to you: \"{}\"", text),
        EventKind::ChatMention => format!(
            "{} mentions you in chat: \"{}\"",
            author.unwrap_or("someone"),
            text
        ),
        EventKind::ChatMessage => format!("{} in chat: \"{}\"", author.unwrap_or("someone"), text),
        EventKind::ScreenChange => format!("On screen: {}", text),
        EventKind::Tick => "It has been quiet for a while.".to_string(),
        EventKind::Shutdown => "The stream is ending.".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Speak,
    Emotion,
    Think,
    Nothing,
}

const TAGS: [(&str, Tag); 4] = [
    ("SPEAK", Tag::Speak),
    ("EMOTION", Tag::Emotion),
    ("THINK", Tag::Think),
    ("NOTHING", Tag::Nothing),
];

/// Interprets a raw model answer.
///
/// The first tagged line decides the kind; an EMOTION line after a SPEAK
/// line colours it. Untagged text is spoken, unless it is a bare emotion
/// label. Empty answers are NO_OP.
pub fn parse_decision(raw: &str) -> Decision {
    let raw = raw.trim();
    if raw.is_empty() {
        warn!("Empty response received");
        return Decision::no_op();
    }

    let mut tagged = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(split_tag);

    let Some((tag, content)) = tagged.next() else {
        if let Ok(emotion) = raw.parse::<Emotion>() {
            debug!("Bare emotion label read as EMOTION");
            return Decision::emote(emotion);
        }
        debug!("Untagged response read as SPEAK");
        return speak(raw);
    };

    match tag {
        Tag::Speak => {
            let mut decision = speak(content);
            let emotion = tagged
                .find(|(tag, _)| *tag == Tag::Emotion)
                .and_then(|(_, label)| parse_emotion(label));
            if let Some(emotion) = emotion {
                decision = decision.with_emotion(emotion);
            }
            decision
        }
        Tag::Emotion => parse_emotion(content).map_or_else(Decision::no_op, Decision::emote),
        Tag::Think => Decision::think(content),
        Tag::Nothing => Decision::no_op(),
    }
}

/// `TAG: content`, `[TAG] content`, case-insensitive. Content wrapped in
/// brackets is unwrapped.
fn split_tag(line: &str) -> Option<(Tag, &str)> {
    TAGS.iter().find_map(|(name, tag)| {
        let rest = strip_prefix_ignore_case(line, name)
            .and_then(|rest| rest.trim_start().strip_prefix(':'))
            .or_else(|| {
                line.strip_prefix('[')
                    .and_then(|inner| strip_prefix_ignore_case(inner, name))
                    .and_then(|rest| rest.strip_prefix(']'))
            })
            .or_else(|| {
                // NOTHING stands alone.
                (*tag == Tag::Nothing && line.eq_ignore_ascii_case(name)).then_some("")
            })?;
        Some((*tag, unwrap_brackets(rest.trim())))
    })
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &line[prefix.len()..])
}

fn unwrap_brackets(content: &str) -> &str {
    content
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .map_or(content, str::trim)
}

fn parse_emotion(label: &str) -> Option<Emotion> {
    match label.parse::<Emotion>() {
        Ok(emotion) => Some(emotion),
        Err(e) => {
            warn!("Ignoring {}", e);
            None
        }
    }
}

fn speak(text: &str) -> Decision {
    match text.char_indices().nth(MAX_SPEECH_CHARS) {
        Some((cut, _)) => {
            warn!("Speech too long ({} chars), truncating", text.chars().count());
            Decision::speak(format!("{}...", &text[..cut]))
        }
        None => Decision::speak(text),
    }
}
