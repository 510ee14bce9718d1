use serde_json::json;
use sleuth_core::llm::{
    ClaudeClient, Conversation, LLMError, Message, OpenAIClient, ToolCall, ToolDefinition, LLM,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn search_tool() -> ToolDefinition {
    ToolDefinition {
        name: "search_web".to_string(),
        description: "Search the web".to_string(),
        parameters: json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        }),
    }
}

fn question() -> Conversation {
    let mut conversation = Conversation::new();
    conversation.push(Message::system("You are a researcher."));
    conversation.push(Message::user("What is the capital of France?"));
    conversation
}

mod openai {
    use super::*;

    #[tokio::test]
    async fn test_tool_call_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {
                                "name": "search_web",
                                "arguments": "{\"query\":\"capital of France\"}"
                            }
                        }]
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAIClient::new(format!("{}/v1", server.uri()), "test-key", "gpt-4o");
        let response = client.chat(&question(), &[search_tool()]).await.unwrap();

        assert!(response.wants_tools());
        assert_eq!(response.tool_calls[0].id, "call_1");
        assert_eq!(response.tool_calls[0].arguments["query"], "capital of France");
    }

    #[tokio::test]
    async fn test_local_server_without_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Paris." } }]
            })))
            .mount(&server)
            .await;

        let client = OpenAIClient::new(format!("{}/v1/", server.uri()), "", "llama3.2");
        let response = client.chat(&question(), &[]).await.unwrap();

        assert_eq!(response.content, "Paris.");
        assert!(!response.wants_tools());

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = OpenAIClient::new(server.uri(), "k", "m");

        let first = client.chat(&question(), &[]).await.unwrap_err();
        assert!(matches!(first, LLMError::RateLimited));

        let second = client.chat(&question(), &[]).await.unwrap_err();
        assert!(matches!(second, LLMError::ApiError { status: 503, .. }));
        assert!(second.is_transient());
    }

    #[tokio::test]
    async fn test_no_choices_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = OpenAIClient::new(server.uri(), "k", "m");
        let err = client.chat(&question(), &[]).await.unwrap_err();
        assert!(matches!(err, LLMError::ParseError(_)));
    }
}

mod claude {
    use super::*;

    #[tokio::test]
    async fn test_tool_use_and_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    { "type": "text", "text": "Let me check." },
                    {
                        "type": "tool_use",
                        "id": "toolu_1",
                        "name": "search_web",
                        "input": { "query": "capital of France" }
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ClaudeClient::new("test-key")
            .with_api_url(format!("{}/v1/messages", server.uri()));
        let response = client.chat(&question(), &[search_tool()]).await.unwrap();

        assert_eq!(response.content, "Let me check.");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "search_web");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["system"], "You are a researcher.");
        assert_eq!(body["tools"][0]["input_schema"]["required"][0], "query");
    }

    #[tokio::test]
    async fn test_final_call_without_tools_sends_no_tool_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{ "type": "text", "text": "Paris is the capital of France [S1]." }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut conversation = question();
        conversation.push(Message::assistant(
            "",
            vec![ToolCall::new("toolu_1", "search_web", json!({ "query": "capital of France" }))],
        ));
        conversation.push(Message::tool("toolu_1", "search_web", "Evidence [S1]: Paris is the capital."));
        conversation.push(Message::user("Answer from the evidence gathered so far."));

        let client = ClaudeClient::new("test-key")
            .with_api_url(format!("{}/v1/messages", server.uri()));
        let response = client.chat(&conversation, &[]).await.unwrap();
        assert_eq!(response.content, "Paris is the capital of France [S1].");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("tools").is_none());
        let raw = String::from_utf8_lossy(&requests[0].body).to_string();
        assert!(!raw.contains("tool_use"));
        assert!(!raw.contains("tool_result"));
        assert!(raw.contains("Evidence [S1]: Paris is the capital."));

        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
    }

    #[tokio::test]
    async fn test_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
            .mount(&server)
            .await;

        let client = ClaudeClient::new("bad").with_api_url(server.uri());
        let err = client.chat(&question(), &[]).await.unwrap_err();
        assert!(matches!(err, LLMError::ApiError { status: 401, .. }));
        assert!(!err.is_transient());
    }
}
