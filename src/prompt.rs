//! Prompt metadata embedded in PNG files.
//!
//! Image generators store their prompt in PNG text chunks:
//! - `prompt` holds a JSON node graph; the text input of every
//!   `CLIPTextEncode` node is collected, in graph order
//! - `parameters` holds a text block; the prompt is everything before the
//!   `Negative prompt:` or `Steps:` line
//!
//! The collected text is split on a `---` line into a positive and a
//! negative part.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// Separates the positive prompt from the negative one.
const PROMPT_SEPARATOR: &str = "\n---\n";

/// Characters of a prompt shown before it is shortened.
const DISPLAY_LIMIT: usize = 100;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Why no prompt could be extracted. The message is shown as is.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("No filepath provided")]
    NoPath,

    #[error("File not found")]
    NotFound,

    #[error("File is not a PNG")]
    NotPng,

    #[error("File is not a valid PNG")]
    InvalidPng,

    #[error("Error reading file: {0}")]
    Read(String),

    #[error("No prompt metadata found in PNG")]
    NoMetadata,
}

/// Prompt recovered from a PNG.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedPrompt {
    /// Raw text of the metadata chunk the prompt came from.
    pub prompt_json: String,
    pub positive: String,
    pub negative: String,
}

impl ExtractedPrompt {
    /// Summary lines for display, with long prompts shortened.
    pub fn display_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if !self.positive.is_empty() {
            lines.push(format!("Positive: {}", shorten(&self.positive)));
        }
        if !self.negative.is_empty() {
            lines.push(format!("Negative: {}", shorten(&self.negative)));
        }
        if lines.is_empty() {
            lines.push("No prompts extracted".to_string());
        }
        lines
    }
}

/// Extract the prompt embedded in the PNG at `path`.
pub fn extract_prompt(path: &str) -> Result<ExtractedPrompt, PromptError> {
    if path.is_empty() {
        return Err(PromptError::NoPath);
    }
    let file_path = Path::new(path);
    if !file_path.exists() {
        return Err(PromptError::NotFound);
    }
    if !path.to_lowercase().ends_with(".png") {
        return Err(PromptError::NotPng);
    }

    let chunks = read_text_chunks(file_path)?;
    debug!(
        path,
        keys = ?chunks.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
        "Read PNG text chunks"
    );

    let find = |keyword: &str| {
        chunks
            .iter()
            .find(|(k, _)| k == keyword)
            .map(|(_, text)| text.clone())
    };
    let (prompt_json, text) = if let Some(raw) = find("prompt") {
        let text = graph_prompt_text(&raw);
        (raw, text)
    } else if let Some(raw) = find("parameters") {
        let text = parameters_prompt_text(&raw);
        (raw, text)
    } else {
        return Err(PromptError::NoMetadata);
    };

    let (positive, negative) = split_prompt(&text);
    info!(
        path,
        positive = positive.len(),
        negative = negative.len(),
        "Extracted prompt"
    );
    Ok(ExtractedPrompt {
        prompt_json,
        positive,
        negative,
    })
}

/// Text chunks of a PNG as `(keyword, text)`, plain chunks first.
fn read_text_chunks(path: &Path) -> Result<Vec<(String, String)>, PromptError> {
    let mut file = File::open(path).map_err(read_error)?;
    let mut header = Vec::with_capacity(32);
    (&mut file)
        .take(32)
        .read_to_end(&mut header)
        .map_err(read_error)?;
    if !header.starts_with(&PNG_SIGNATURE) {
        // Another image format under a .png name is told apart from junk.
        return Err(match image::guess_format(&header) {
            Ok(_) => PromptError::InvalidPng,
            Err(e) => read_error(e),
        });
    }
    file.rewind().map_err(read_error)?;

    let reader = png::Decoder::new(BufReader::new(file))
        .read_info()
        .map_err(read_error)?;
    let info = reader.info();

    let mut chunks: Vec<(String, String)> = info
        .uncompressed_latin1_text
        .iter()
        .map(|chunk| (chunk.keyword.clone(), chunk.text.clone()))
        .collect();
    for chunk in &info.compressed_latin1_text {
        match chunk.get_text() {
            Ok(text) => chunks.push((chunk.keyword.clone(), text)),
            Err(e) => debug!(keyword = %chunk.keyword, error = %e, "Unreadable zTXt chunk"),
        }
    }
    for chunk in &info.utf8_text {
        match chunk.get_text() {
            Ok(text) => chunks.push((chunk.keyword.clone(), text)),
            Err(e) => debug!(keyword = %chunk.keyword, error = %e, "Unreadable iTXt chunk"),
        }
    }
    Ok(chunks)
}

fn read_error(e: impl std::fmt::Display) -> PromptError {
    PromptError::Read(e.to_string())
}

/// Texts of the `CLIPTextEncode` nodes of a JSON node graph, separated by `---` lines.
///
/// Unparseable graphs yield no text.
fn graph_prompt_text(raw: &str) -> String {
    let Ok(Value::Object(nodes)) = serde_json::from_str::<Value>(raw) else {
        return String::new();
    };

    let texts: Vec<&str> = nodes
        .values()
        .filter_map(|node| {
            let class_type = node.get("class_type")?.as_str()?;
            if !class_type.contains("CLIPTextEncode") {
                return None;
            }
            node.get("inputs")?
                .get("text")?
                .as_str()
                .filter(|text| !text.is_empty())
        })
        .collect();
    texts.join(PROMPT_SEPARATOR)
}

/// The prompt lines of a `parameters` block.
fn parameters_prompt_text(parameters: &str) -> String {
    parameters
        .split('\n')
        .take_while(|line| !line.starts_with("Negative prompt:") && !line.starts_with("Steps:"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Split on the first `---` line into trimmed positive and negative parts.
fn split_prompt(text: &str) -> (String, String) {
    match text.split_once(PROMPT_SEPARATOR) {
        Some((positive, negative)) => (positive.trim().to_string(), negative.trim().to_string()),
        None => (text.trim().to_string(), String::new()),
    }
}

fn shorten(text: &str) -> String {
    match text.char_indices().nth(DISPLAY_LIMIT) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_loader::tests::png_bytes;

    /// A 1x1 PNG carrying the given text chunks.
    fn png_with_text(chunks: &[(&str, &str)]) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut bytes, 1, 1);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            for (keyword, text) in chunks {
                encoder
                    .add_text_chunk(keyword.to_string(), text.to_string())
                    .unwrap();
            }
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[0, 0, 0, 255]).unwrap();
        }
        bytes
    }

    fn write(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_graph_prompt() {
        let graph = r#"{
            "3": {"class_type": "KSampler", "inputs": {"seed": 1}},
            "6": {"class_type": "CLIPTextEncode", "inputs": {"text": "a red fox"}},
            "7": {"class_type": "CLIPTextEncodeSDXL", "inputs": {"text": "blurry"}},
            "8": {"class_type": "CLIPTextEncode", "inputs": {"text": ""}},
            "9": "not a node"
        }"#;
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "fox.png", &png_with_text(&[("prompt", graph)]));

        let prompt = extract_prompt(&path).unwrap();
        assert_eq!(prompt.prompt_json, graph);
        assert_eq!(prompt.positive, "a red fox");
        assert_eq!(prompt.negative, "blurry");
        assert_eq!(
            prompt.display_lines(),
            ["Positive: a red fox", "Negative: blurry"]
        );
    }

    #[test]
    fn test_graph_prompt_keeps_node_order() {
        let graph = r#"{"9": {"class_type": "CLIPTextEncode", "inputs": {"text": "first"}},
                        "10": {"class_type": "CLIPTextEncode", "inputs": {"text": "second"}},
                        "2": {"class_type": "CLIPTextEncode", "inputs": {"text": "third"}}}"#;
        assert_eq!(graph_prompt_text(graph), "first\n---\nsecond\n---\nthird");
        assert_eq!(graph_prompt_text("{not json"), "");
        assert_eq!(graph_prompt_text("[1, 2]"), "");
    }

    #[test]
    fn test_parameters_prompt() {
        let parameters = "castle on a hill,\nsunset\nNegative prompt: fog\nSteps: 20, Sampler: Euler";
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "castle.PNG",
            &png_with_text(&[("parameters", parameters)]),
        );

        let prompt = extract_prompt(&path).unwrap();
        assert_eq!(prompt.prompt_json, parameters);
        assert_eq!(prompt.positive, "castle on a hill,\nsunset");
        assert!(prompt.negative.is_empty());
    }

    #[test]
    fn test_prompt_chunk_wins_over_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let graph = r#"{"1": {"class_type": "CLIPTextEncode", "inputs": {"text": "graph"}}}"#;
        let path = write(
            &dir,
            "both.png",
            &png_with_text(&[("parameters", "plain"), ("prompt", graph)]),
        );
        assert_eq!(extract_prompt(&path).unwrap().positive, "graph");
    }

    #[test]
    fn test_split_prompt() {
        assert_eq!(split_prompt(""), (String::new(), String::new()));
        assert_eq!(
            split_prompt(" pos \n---\n neg "),
            ("pos".to_string(), "neg".to_string())
        );
        assert_eq!(
            split_prompt("a\n---\nb\n---\nc"),
            ("a".to_string(), "b\n---\nc".to_string())
        );
    }

    #[test]
    fn test_display_lines_shorten_long_prompts() {
        let prompt = ExtractedPrompt {
            positive: "é".repeat(150),
            ..ExtractedPrompt::default()
        };
        let lines = prompt.display_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], format!("Positive: {}...", "é".repeat(100)));

        assert_eq!(
            ExtractedPrompt::default().display_lines(),
            ["No prompts extracted"]
        );
    }

    #[test]
    fn test_extraction_failures() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(extract_prompt(""), Err(PromptError::NoPath)));

        let missing = dir.path().join("gone.png").to_string_lossy().into_owned();
        assert!(matches!(extract_prompt(&missing), Err(PromptError::NotFound)));

        let text = write(&dir, "notes.txt", b"hello");
        assert!(matches!(extract_prompt(&text), Err(PromptError::NotPng)));

        let plain = write(&dir, "plain.png", &png_bytes(2, 2, 255));
        assert!(matches!(extract_prompt(&plain), Err(PromptError::NoMetadata)));

        let mut jpeg = Vec::new();
        image::RgbImage::new(2, 2)
            .write_to(
                &mut std::io::Cursor::new(&mut jpeg),
                image::ImageFormat::Jpeg,
            )
            .unwrap();
        let renamed = write(&dir, "photo.png", &jpeg);
        assert!(matches!(extract_prompt(&renamed), Err(PromptError::InvalidPng)));

        let junk = write(&dir, "junk.png", b"definitely not an image");
        let err = extract_prompt(&junk).unwrap_err();
        assert!(matches!(err, PromptError::Read(_)));
        assert!(err.to_string().starts_with("Error reading file: "));
    }
}
