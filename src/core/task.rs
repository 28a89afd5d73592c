//! Task tokens for task-prompted models and their output post-processing

use serde_json::{json, Map, Value};
use std::fmt;

use crate::config::DEFAULT_TASK;

/// Coordinate grid the location tokens are quantized to
const LOCATION_BINS: f32 = 1000.0;

/// Special tokens removed from raw generations
const SPECIAL_TOKENS: &[&str] = &["</s>", "<s>", "<pad>"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskToken {
	Caption,
	DetailedCaption,
	MoreDetailedCaption,
	CaptionToPhraseGrounding,
	ObjectDetection,
	DenseRegionCaption,
	RegionProposal,
	Ocr,
	OcrWithRegion,
	Analyze,
	GenerateTags,
	MixedCaption,
	MixedCaptionPlus,
}

/// Shape of a task's post-processed answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutput {
	Text,
	Boxes,
	QuadBoxes,
}

impl TaskToken {
	pub const ALL: [TaskToken; 13] = [
		TaskToken::Caption,
		TaskToken::DetailedCaption,
		TaskToken::MoreDetailedCaption,
		TaskToken::CaptionToPhraseGrounding,
		TaskToken::ObjectDetection,
		TaskToken::DenseRegionCaption,
		TaskToken::RegionProposal,
		TaskToken::Ocr,
		TaskToken::OcrWithRegion,
		TaskToken::Analyze,
		TaskToken::GenerateTags,
		TaskToken::MixedCaption,
		TaskToken::MixedCaptionPlus,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			TaskToken::Caption => "<CAPTION>",
			TaskToken::DetailedCaption => "<DETAILED_CAPTION>",
			TaskToken::MoreDetailedCaption => "<MORE_DETAILED_CAPTION>",
			TaskToken::CaptionToPhraseGrounding => "<CAPTION_TO_PHRASE_GROUNDING>",
			TaskToken::ObjectDetection => "<OD>",
			TaskToken::DenseRegionCaption => "<DENSE_REGION_CAPTION>",
			TaskToken::RegionProposal => "<REGION_PROPOSAL>",
			TaskToken::Ocr => "<OCR>",
			TaskToken::OcrWithRegion => "<OCR_WITH_REGION>",
			TaskToken::Analyze => "<ANALYZE>",
			TaskToken::GenerateTags => "<GENERATE_TAGS>",
			TaskToken::MixedCaption => "<MIXED_CAPTION>",
			TaskToken::MixedCaptionPlus => "<MIXED_CAPTION_PLUS>",
		}
	}

	pub fn parse(token: &str) -> Option<Self> {
		Self::ALL.iter().copied().find(|t| t.as_str() == token)
	}

	/// Natural-language prompt the processor substitutes for the token.
	/// Fine-tuned tokens (tags, mixed captions) pass through verbatim.
	pub fn prompt(&self, text_input: &str) -> String {
		match self {
			TaskToken::Caption => "What does the image describe?".into(),
			TaskToken::DetailedCaption => "Describe in detail what is shown in the image.".into(),
			TaskToken::MoreDetailedCaption => "Describe with a paragraph what is shown in the image.".into(),
			TaskToken::CaptionToPhraseGrounding => {
				format!("Locate the phrases in the caption: {}", text_input)
			}
			TaskToken::ObjectDetection => "Locate the objects with category name in the image.".into(),
			TaskToken::DenseRegionCaption => "Locate the objects in the image, with their descriptions.".into(),
			TaskToken::RegionProposal => "Locate the region proposals in the image.".into(),
			TaskToken::Ocr => "What is the text in the image?".into(),
			TaskToken::OcrWithRegion => "What is the text in the image, with regions?".into(),
			TaskToken::Analyze
			| TaskToken::GenerateTags
			| TaskToken::MixedCaption
			| TaskToken::MixedCaptionPlus => self.as_str().into(),
		}
	}

	pub fn output(&self) -> TaskOutput {
		match self {
			TaskToken::ObjectDetection
			| TaskToken::DenseRegionCaption
			| TaskToken::RegionProposal
			| TaskToken::CaptionToPhraseGrounding => TaskOutput::Boxes,
			TaskToken::OcrWithRegion => TaskOutput::QuadBoxes,
			_ => TaskOutput::Text,
		}
	}
}

impl fmt::Display for TaskToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Split a question into its task token and the remaining text.
///
/// A question starting with `<` names its task up to the first `>`;
/// anything else asks for the default detailed caption.
pub fn extract_task(question: &str) -> (String, &str) {
	if !question.starts_with('<') {
		return (DEFAULT_TASK.to_string(), "");
	}
	match question.split_once('>') {
		Some((head, rest)) => (format!("{}>", head), rest.trim()),
		None => (format!("{}>", question), ""),
	}
}

/// Prompt text for a (possibly unknown) task token
pub fn prompt_for(task: &str, text_input: &str) -> String {
	match TaskToken::parse(task) {
		Some(token) => token.prompt(text_input),
		None => task.to_string(),
	}
}

/// Turn a raw generation into `{ task: answer }`, with region tasks parsed
/// into pixel-space boxes
pub fn post_process(task: &str, generated: &str, image_size: (u32, u32)) -> Value {
	let cleaned = strip_special_tokens(generated);
	let output = TaskToken::parse(task).map(|t| t.output()).unwrap_or(TaskOutput::Text);

	let answer = match output {
		TaskOutput::Text => Value::String(cleaned),
		TaskOutput::Boxes => {
			let (labels, boxes) = parse_regions(&cleaned, 4, image_size);
			json!({ "bboxes": boxes, "labels": labels })
		}
		TaskOutput::QuadBoxes => {
			let (labels, boxes) = parse_regions(&cleaned, 8, image_size);
			json!({ "quad_boxes": boxes, "labels": labels })
		}
	};

	let mut map = Map::new();
	map.insert(task.to_string(), answer);
	Value::Object(map)
}

/// Pull the answer out of a post-processed value and flatten it to one line
pub fn extract_answer(parsed: Value, task: &str) -> String {
	let value = [task, "task", "answer"]
		.iter()
		.fold(parsed, |value, key| take_field(value, key));

	let text = match value {
		Value::String(s) => s,
		other => serde_json::to_string(&other).unwrap_or_default(),
	};
	sanitize(&text)
}

/// Remove newline, carriage-return and tab characters, then trim
pub fn sanitize(text: &str) -> String {
	text.chars()
		.filter(|c| !matches!(c, '\n' | '\r' | '\t'))
		.collect::<String>()
		.trim()
		.to_string()
}

fn take_field(value: Value, key: &str) -> Value {
	match value {
		Value::Object(mut map) => match map.remove(key) {
			Some(inner) => inner,
			None => Value::Object(map),
		},
		other => other,
	}
}

fn strip_special_tokens(text: &str) -> String {
	SPECIAL_TOKENS
		.iter()
		.fold(text.to_string(), |acc, token| acc.replace(token, ""))
}

enum Piece<'a> {
	Text(&'a str),
	Loc(u32),
}

fn split_locations(text: &str) -> Vec<Piece<'_>> {
	let mut pieces = Vec::new();
	let mut rest = text;

	while let Some(start) = rest.find("<loc_") {
		let after = &rest[start + 5..];
		let Some(end) = after.find('>') else { break };

		match after[..end].parse::<u32>() {
			Ok(bin) => {
				if start > 0 {
					pieces.push(Piece::Text(&rest[..start]));
				}
				pieces.push(Piece::Loc(bin));
			}
			Err(_) => pieces.push(Piece::Text(&rest[..start + 5 + end + 1])),
		}
		rest = &after[end + 1..];
	}

	if !rest.is_empty() {
		pieces.push(Piece::Text(rest));
	}
	pieces
}

/// Group location tokens into boxes of `arity` coordinates, each labelled by
/// the text preceding it. Consecutive boxes without new text share a label.
fn parse_regions(text: &str, arity: usize, (width, height): (u32, u32)) -> (Vec<String>, Vec<Vec<f32>>) {
	let mut labels = Vec::new();
	let mut boxes = Vec::new();
	let mut label = String::new();
	let mut coords: Vec<u32> = Vec::with_capacity(arity);

	for piece in split_locations(text) {
		match piece {
			Piece::Text(t) => {
				let t = t.trim();
				if !t.is_empty() {
					label = t.to_string();
				}
				coords.clear();
			}
			Piece::Loc(bin) => {
				coords.push(bin);
				if coords.len() == arity {
					let scaled = coords
						.iter()
						.enumerate()
						.map(|(i, &b)| {
							let size = if i % 2 == 0 { width } else { height };
							dequantize(b, size)
						})
						.collect();
					boxes.push(scaled);
					labels.push(label.clone());
					coords.clear();
				}
			}
		}
	}

	(labels, boxes)
}

fn dequantize(bin: u32, size: u32) -> f32 {
	(bin as f32 + 0.5) * size as f32 / LOCATION_BINS
}
