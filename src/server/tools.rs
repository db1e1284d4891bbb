//! Tool catalogue and dispatch
//!
//! Each tool maps 1:1 onto a session manager operation. Failures are
//! classified by error kind so the protocol layer can answer with the
//! right JSON-RPC code and, for unlaunched sessions, launch-first
//! guidance.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::session::{
    ClickOptions, LaunchOptions, ScreenshotData, ScreenshotOptions, SessionManager, TypeOptions,
};
use crate::Error;

/// A schema-described tool exposed over the wire
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Successful tool invocation
#[derive(Debug)]
pub struct ToolOutcome {
    /// Human-readable confirmation
    pub text: String,
    /// Structured payload, where the tool has one
    pub data: Option<Value>,
}

impl ToolOutcome {
    fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }
}

/// Failed tool invocation, pre-classified for the protocol layer
#[derive(Debug)]
pub enum ToolError {
    /// No tool with this name exists
    UnknownTool(String),
    /// Arguments did not match the tool's schema
    InvalidArgs(String),
    /// The session manager rejected or failed the operation
    Session(Error),
}

impl From<Error> for ToolError {
    fn from(e: Error) -> Self {
        ToolError::Session(e)
    }
}

/// Static catalogue of the seven browser tools
pub fn catalogue() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "browser_launch",
            description: "Launch the browser session",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "headless": { "type": "boolean", "description": "Run without a visible window" }
                }
            }),
        },
        ToolSpec {
            name: "browser_navigate",
            description: "Navigate the page to a URL",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "Destination URL" }
                },
                "required": ["url"]
            }),
        },
        ToolSpec {
            name: "browser_find",
            description: "Inspect the first element matching a CSS selector",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector" },
                    "timeoutMs": { "type": "number", "description": "Wait timeout in milliseconds" }
                },
                "required": ["selector"]
            }),
        },
        ToolSpec {
            name: "browser_click",
            description: "Click the first element matching a CSS selector",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector" },
                    "timeoutMs": { "type": "number", "description": "Actionability timeout in milliseconds" }
                },
                "required": ["selector"]
            }),
        },
        ToolSpec {
            name: "browser_type",
            description: "Type text into the first element matching a CSS selector",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string", "description": "CSS selector" },
                    "text": { "type": "string", "description": "Text to type" },
                    "timeoutMs": { "type": "number", "description": "Actionability timeout in milliseconds" },
                    "clear": { "type": "boolean", "description": "Clear the current value first" }
                },
                "required": ["selector", "text"]
            }),
        },
        ToolSpec {
            name: "browser_screenshot",
            description: "Capture a screenshot of the current page",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "filename": { "type": "string", "description": "File name inside the screenshot directory" },
                    "fullPage": { "type": "boolean", "description": "Capture the full scrollable height" },
                    "returnBase64": { "type": "boolean", "description": "Return the image as base64" }
                }
            }),
        },
        ToolSpec {
            name: "browser_quit",
            description: "Close the browser session",
            input_schema: json!({ "type": "object", "properties": {} }),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct LaunchArgs {
    headless: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct NavigateArgs {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectorArgs {
    selector: String,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeArgs {
    selector: String,
    text: String,
    timeout_ms: Option<u64>,
    #[serde(default)]
    clear: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ScreenshotArgs {
    filename: Option<String>,
    #[serde(default)]
    full_page: bool,
    #[serde(default)]
    return_base64: bool,
}

fn parse_args<T: for<'de> Deserialize<'de>>(name: &str, args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone())
        .map_err(|e| ToolError::InvalidArgs(format!("Invalid arguments for {}: {}", name, e)))
}

/// Dispatch one tool invocation against the shared session
pub async fn call_tool(
    session: &SessionManager,
    name: &str,
    args: &Value,
) -> Result<ToolOutcome, ToolError> {
    match name {
        "browser_launch" => {
            let args: LaunchArgs = parse_args(name, args)?;
            let headless = args.headless;
            session
                .launch(LaunchOptions {
                    headless,
                    slow_mo_ms: None,
                })
                .await?;
            let effective = headless.unwrap_or(session.config().headless);
            Ok(ToolOutcome::text_only(format!(
                "Browser launched (headless={})",
                effective
            )))
        }

        "browser_navigate" => {
            let args: NavigateArgs = parse_args(name, args)?;
            session.navigate(&args.url).await?;
            Ok(ToolOutcome::text_only(format!("Navigated to {}", args.url)))
        }

        "browser_find" => {
            let args: SelectorArgs = parse_args(name, args)?;
            let info = session
                .element_info(
                    &args.selector,
                    ClickOptions {
                        timeout_ms: args.timeout_ms,
                    },
                )
                .await?;

            let text = if info.found {
                format!(
                    "Found element {} (tag={})",
                    args.selector,
                    info.tag.as_deref().unwrap_or("unknown")
                )
            } else {
                format!("No element matches {}", args.selector)
            };

            let data = serde_json::to_value(&info).map_err(Error::from)?;
            Ok(ToolOutcome {
                text,
                data: Some(data),
            })
        }

        "browser_click" => {
            let args: SelectorArgs = parse_args(name, args)?;
            session
                .click(
                    &args.selector,
                    ClickOptions {
                        timeout_ms: args.timeout_ms,
                    },
                )
                .await?;
            Ok(ToolOutcome::text_only(format!("Clicked {}", args.selector)))
        }

        "browser_type" => {
            let args: TypeArgs = parse_args(name, args)?;
            session
                .type_text(
                    &args.selector,
                    &args.text,
                    TypeOptions {
                        timeout_ms: args.timeout_ms,
                        clear: args.clear,
                    },
                )
                .await?;
            Ok(ToolOutcome::text_only(format!(
                "Typed {} characters into {}",
                args.text.chars().count(),
                args.selector
            )))
        }

        "browser_screenshot" => {
            let args: ScreenshotArgs = parse_args(name, args)?;
            let path = args
                .filename
                .as_ref()
                .map(|name| session.screenshot_dir().join(name));

            let shot = session
                .screenshot(ScreenshotOptions {
                    path,
                    full_page: args.full_page,
                    return_base64: args.return_base64,
                })
                .await?;

            let mut parts = Vec::new();
            let mut data = serde_json::Map::new();
            if let Some(path) = &shot.path {
                parts.push(format!("Screenshot saved to {}", path.display()));
                data.insert("path".to_string(), json!(path.display().to_string()));
            }
            match shot.data {
                ScreenshotData::Base64(encoded) => {
                    parts.push(format!("returned {} base64 characters", encoded.len()));
                    data.insert("base64".to_string(), json!(encoded));
                }
                ScreenshotData::Bytes(bytes) => {
                    if shot.path.is_none() {
                        parts.push(format!("captured {} bytes", bytes.len()));
                    }
                }
            }

            Ok(ToolOutcome {
                text: parts.join("; "),
                data: if data.is_empty() {
                    None
                } else {
                    Some(Value::Object(data))
                },
            })
        }

        "browser_quit" => {
            session.quit().await?;
            Ok(ToolOutcome::text_only("Browser session closed"))
        }

        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_names() {
        let names: Vec<&str> = catalogue().iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "browser_launch",
                "browser_navigate",
                "browser_find",
                "browser_click",
                "browser_type",
                "browser_screenshot",
                "browser_quit",
            ]
        );
    }

    #[test]
    fn test_schemas_declare_required_fields() {
        for tool in catalogue() {
            assert_eq!(tool.input_schema["type"], "object");
        }
        let navigate = catalogue()
            .into_iter()
            .find(|t| t.name == "browser_navigate")
            .unwrap();
        assert_eq!(navigate.input_schema["required"][0], "url");
    }
}
