//! OpenAI-compatible chat-completions backend
//!
//! Serves both the OpenAI API and OpenRouter, which exposes the same wire
//! format. Requests carry a strict `json_schema` response format and, when
//! the generation offers tools, function tool declarations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use flowgate_config::Config;

use crate::LlmError;
use crate::http_client::HttpClient;
use crate::types::{
    LlmBackend, LlmInvocation, LlmOutput, LlmResult, Message, ResponseFormat, Role,
    ToolCallRequest, ToolDefinition,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Attribution headers OpenRouter asks clients to send
const OPENROUTER_REFERER: &str = "https://github.com/EffortlessMetrics/flowgate";
const OPENROUTER_TITLE: &str = "flowgate";

#[derive(Clone)]
pub(crate) struct OpenAiCompatibleBackend {
    client: Arc<HttpClient>,
    provider: String,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

/// HTTP request parameters
#[derive(Debug, Clone)]
pub(crate) struct HttpParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.2,
        }
    }
}

impl OpenAiCompatibleBackend {
    /// # Errors
    ///
    /// Returns `LlmError::Unsupported` for a provider other than `openai` or
    /// `openrouter`, and `LlmError::Misconfiguration` if the HTTP client
    /// cannot be constructed.
    pub fn new(
        provider: &str,
        api_key: String,
        base_url: Option<String>,
        default_model: String,
        default_params: HttpParams,
    ) -> Result<Self, LlmError> {
        let default_url = match provider {
            "openai" => OPENAI_BASE_URL,
            "openrouter" => OPENROUTER_BASE_URL,
            other => {
                return Err(LlmError::Unsupported(format!(
                    "Provider '{other}' is not OpenAI-compatible"
                )));
            }
        };

        Ok(Self {
            client: Arc::new(HttpClient::new()?),
            provider: provider.to_string(),
            base_url: base_url.unwrap_or_else(|| default_url.to_string()),
            api_key,
            default_model,
            default_params,
        })
    }

    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the API key environment variable
    /// is not set or the HTTP client cannot be constructed.
    pub fn new_from_config(config: &Config) -> Result<Self, LlmError> {
        let provider = config.provider();
        let api_key_env = config.api_key_env();

        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                LlmError::Misconfiguration(format!(
                    "API key for '{}' not found in environment variable '{}'. \
                     Set this variable or configure a different api_key_env in [llm].",
                    provider, api_key_env
                ))
            })?;

        let default_params = HttpParams {
            max_tokens: config.llm.max_tokens.unwrap_or(2048),
            temperature: config.llm.temperature.unwrap_or(0.2),
        };

        Self::new(
            provider,
            api_key,
            config.llm.base_url.clone(),
            config.model().to_string(),
            default_params,
        )
    }

    /// Resolve parameters for this invocation
    ///
    /// Precedence:
    /// 1. `inv.model` overrides `default_model`
    /// 2. `inv.metadata["max_tokens"]` / `inv.metadata["temperature"]` override defaults
    fn resolve_params(&self, inv: &LlmInvocation) -> (String, HttpParams) {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };

        let max_tokens = inv
            .metadata
            .get("max_tokens")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(self.default_params.max_tokens);

        let temperature = inv
            .metadata
            .get("temperature")
            .and_then(|v| v.as_f64())
            .map(|v| v as f32)
            .unwrap_or(self.default_params.temperature);

        (
            model,
            HttpParams {
                max_tokens,
                temperature,
            },
        )
    }

    fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|msg| {
                let tool_calls = if msg.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        msg.tool_calls
                            .iter()
                            .map(|call| WireToolCall {
                                id: call.id.clone(),
                                kind: "function".to_string(),
                                function: WireFunctionCall {
                                    name: call.name.clone(),
                                    arguments: call.arguments.to_string(),
                                },
                            })
                            .collect(),
                    )
                };
                WireMessage {
                    role: match msg.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                        Role::Tool => "tool",
                    }
                    .to_string(),
                    // Assistant turns that only call tools carry null content
                    content: if msg.content.is_empty() && tool_calls.is_some() {
                        None
                    } else {
                        Some(msg.content.clone())
                    },
                    tool_calls,
                    tool_call_id: msg.tool_call_id.clone(),
                }
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Option<Vec<WireTool>> {
        if tools.is_empty() {
            return None;
        }
        Some(
            tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function".to_string(),
                    function: WireFunction {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                        strict: true,
                    },
                })
                .collect(),
        )
    }

    fn convert_response_format(format: &ResponseFormat) -> WireResponseFormat {
        WireResponseFormat {
            kind: "json_schema".to_string(),
            json_schema: WireJsonSchema {
                name: format.name.clone(),
                schema: format.schema.clone(),
                strict: true,
            },
        }
    }

    /// Decide between tool calls and a final answer for one choice.
    fn interpret_choice(&self, message: WireResponseMessage) -> Result<LlmOutput, LlmError> {
        if let Some(calls) = message.tool_calls.filter(|c| !c.is_empty()) {
            let requests = calls
                .into_iter()
                .map(|call| {
                    let arguments = serde_json::from_str(&call.function.arguments).map_err(|e| {
                        LlmError::Transport(format!(
                            "{} returned unreadable arguments for tool '{}': {}",
                            self.provider, call.function.name, e
                        ))
                    })?;
                    Ok(ToolCallRequest {
                        id: call.id,
                        name: call.function.name,
                        arguments,
                    })
                })
                .collect::<Result<Vec<_>, LlmError>>()?;
            return Ok(LlmOutput::ToolCalls(requests));
        }

        if let Some(refusal) = message.refusal {
            return Err(LlmError::Transport(format!(
                "{} refused the request: {}",
                self.provider, refusal
            )));
        }

        message
            .content
            .map(LlmOutput::FinalAnswer)
            .ok_or_else(|| {
                LlmError::Transport(format!(
                    "{} response missing content in choices[0]",
                    self.provider
                ))
            })
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let (model, params) = self.resolve_params(&inv);

        debug!(
            provider = %self.provider,
            step = %inv.step,
            model = %model,
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            tools = inv.tools.len(),
            timeout_secs = inv.timeout.as_secs(),
            "Invoking chat completions"
        );

        let request_body = ChatRequest {
            model: model.clone(),
            messages: Self::convert_messages(&inv.messages),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: false,
            tools: Self::convert_tools(&inv.tools),
            response_format: inv
                .response_format
                .as_ref()
                .map(Self::convert_response_format),
        };

        let mut request = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if self.provider == "openrouter" {
            request = request
                .header("HTTP-Referer", OPENROUTER_REFERER)
                .header("X-Title", OPENROUTER_TITLE);
        }
        let request = request.json(&request_body);

        let response = self
            .client
            .execute_with_retry(request, inv.timeout, &self.provider)
            .await?;

        let response_body: ChatResponse = response.json().await.map_err(|e| {
            LlmError::Transport(format!("Failed to parse {} response: {}", self.provider, e))
        })?;

        let choice = response_body.choices.into_iter().next().ok_or_else(|| {
            LlmError::Transport(format!("{} response missing choices[0]", self.provider))
        })?;

        debug!(
            provider = %self.provider,
            finish_reason = ?choice.finish_reason,
            "Received chat completion"
        );

        let output = self.interpret_choice(choice.message)?;
        let mut result = LlmResult::new(output, self.provider.clone(), model);

        if let Some(usage) = response_body.usage {
            result = result.with_tokens(usage.prompt_tokens, usage.completion_tokens);
        }

        debug!(
            provider = %self.provider,
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "Chat completion finished"
        );

        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded arguments object
    arguments: String,
}

#[derive(Debug, Clone, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
    strict: bool,
}

#[derive(Debug, Clone, Serialize)]
struct WireResponseFormat {
    #[serde(rename = "type")]
    kind: String,
    json_schema: WireJsonSchema,
}

#[derive(Debug, Clone, Serialize)]
struct WireJsonSchema {
    name: String,
    schema: serde_json::Value,
    strict: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: WireResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_utils::test_support::fake_api_key;
    use serde_json::json;
    use serial_test::serial;
    use std::time::Duration;

    fn backend(provider: &str) -> OpenAiCompatibleBackend {
        OpenAiCompatibleBackend::new(
            provider,
            "test-key".to_string(),
            None,
            "default-model".to_string(),
            HttpParams {
                max_tokens: 1024,
                temperature: 0.5,
            },
        )
        .unwrap()
    }

    fn invocation(model: &str) -> LlmInvocation {
        LlmInvocation::new("test-step", model, Duration::from_secs(60), vec![])
    }

    #[test]
    fn test_base_url_per_provider() {
        assert_eq!(backend("openai").base_url, OPENAI_BASE_URL);
        assert_eq!(backend("openrouter").base_url, OPENROUTER_BASE_URL);
        assert!(matches!(
            OpenAiCompatibleBackend::new(
                "anthropic",
                "k".into(),
                None,
                "m".into(),
                HttpParams::default()
            ),
            Err(LlmError::Unsupported(_))
        ));
    }

    #[test]
    fn test_resolve_params_uses_defaults() {
        let (model, params) = backend("openai").resolve_params(&invocation(""));
        assert_eq!(model, "default-model");
        assert_eq!(params.max_tokens, 1024);
        assert_eq!(params.temperature, 0.5);
    }

    #[test]
    fn test_resolve_params_overrides() {
        let inv = invocation("custom-model")
            .with_metadata("max_tokens", json!(4096))
            .with_metadata("temperature", json!(0.0));
        let (model, params) = backend("openai").resolve_params(&inv);
        assert_eq!(model, "custom-model");
        assert_eq!(params.max_tokens, 4096);
        assert_eq!(params.temperature, 0.0);
    }

    #[test]
    fn test_convert_messages_with_tool_turns() {
        let call = ToolCallRequest {
            id: "call_9".into(),
            name: "search_kb".into(),
            arguments: json!({"question": "hours"}),
        };
        let messages = vec![
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant_tool_calls(vec![call]),
            Message::tool_result("call_9", "{\"hits\":0}"),
        ];

        let wire = serde_json::to_value(OpenAiCompatibleBackend::convert_messages(&messages))
            .unwrap();

        assert_eq!(wire[0], json!({"role": "system", "content": "sys"}));
        assert_eq!(wire[2]["role"], "assistant");
        assert_eq!(wire[2]["content"], serde_json::Value::Null);
        assert_eq!(wire[2]["tool_calls"][0]["type"], "function");
        assert_eq!(
            wire[2]["tool_calls"][0]["function"]["arguments"],
            "{\"question\":\"hours\"}"
        );
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_9");
    }

    #[test]
    fn test_request_body_carries_strict_schema_and_tools() {
        let body = ChatRequest {
            model: "m".into(),
            messages: vec![],
            max_tokens: 10,
            temperature: 0.0,
            stream: false,
            tools: OpenAiCompatibleBackend::convert_tools(&[ToolDefinition {
                name: "search_kb".into(),
                description: "Search".into(),
                parameters: json!({"type": "object"}),
            }]),
            response_format: Some(OpenAiCompatibleBackend::convert_response_format(
                &ResponseFormat {
                    name: "answer".into(),
                    schema: json!({"type": "object"}),
                },
            )),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["response_format"]["type"], "json_schema");
        assert_eq!(value["response_format"]["json_schema"]["strict"], true);
        assert_eq!(value["tools"][0]["function"]["name"], "search_kb");
        assert_eq!(value["tools"][0]["function"]["strict"], true);
    }

    #[test]
    fn test_request_body_omits_empty_tools() {
        assert!(OpenAiCompatibleBackend::convert_tools(&[]).is_none());
    }

    #[test]
    fn test_interpret_tool_calls() {
        let message: WireResponseMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "search_kb", "arguments": "{\"question\":\"refunds\"}"}
            }]
        }))
        .unwrap();

        match backend("openai").interpret_choice(message).unwrap() {
            LlmOutput::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "search_kb");
                assert_eq!(calls[0].arguments, json!({"question": "refunds"}));
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn test_interpret_final_answer() {
        let message: WireResponseMessage =
            serde_json::from_value(json!({"role": "assistant", "content": "{\"ok\":true}"}))
                .unwrap();
        assert_eq!(
            backend("openai").interpret_choice(message).unwrap(),
            LlmOutput::FinalAnswer("{\"ok\":true}".into())
        );
    }

    #[test]
    fn test_interpret_bad_tool_arguments() {
        let message: WireResponseMessage = serde_json::from_value(json!({
            "content": null,
            "tool_calls": [{"id": "c", "function": {"name": "f", "arguments": "{not json"}}]
        }))
        .unwrap();
        assert!(matches!(
            backend("openai").interpret_choice(message),
            Err(LlmError::Transport(_))
        ));
    }

    #[test]
    fn test_interpret_missing_content() {
        let message: WireResponseMessage =
            serde_json::from_value(json!({"content": null})).unwrap();
        assert!(matches!(
            backend("openrouter").interpret_choice(message),
            Err(LlmError::Transport(msg)) if msg.contains("openrouter")
        ));
    }

    #[test]
    #[serial]
    fn test_new_from_config_missing_api_key() {
        let test_env_var = "FLOWGATE_TEST_MISSING_KEY";
        unsafe {
            std::env::remove_var(test_env_var);
        }

        let mut config = Config::minimal_for_testing();
        config.llm.api_key_env = Some(test_env_var.to_string());

        match OpenAiCompatibleBackend::new_from_config(&config) {
            Err(LlmError::Misconfiguration(msg)) => {
                assert!(msg.contains(test_env_var), "got: {msg}");
                assert!(msg.contains("not found"), "got: {msg}");
            }
            _ => panic!("Expected Misconfiguration error for missing API key"),
        }
    }

    #[test]
    #[serial]
    fn test_new_from_config_reads_settings() {
        let test_env_var = "FLOWGATE_TEST_PRESENT_KEY";
        unsafe {
            std::env::set_var(test_env_var, fake_api_key());
        }

        let mut config = Config::minimal_for_testing();
        config.llm.provider = Some("openrouter".to_string());
        config.llm.api_key_env = Some(test_env_var.to_string());
        config.llm.model = Some("openai/gpt-4o-mini".to_string());
        config.llm.base_url = Some("http://localhost:8080/v1/chat/completions".to_string());

        let backend = OpenAiCompatibleBackend::new_from_config(&config).unwrap();
        assert_eq!(backend.provider, "openrouter");
        assert_eq!(backend.default_model, "openai/gpt-4o-mini");
        assert_eq!(backend.base_url, "http://localhost:8080/v1/chat/completions");

        unsafe {
            std::env::remove_var(test_env_var);
        }
    }
}
