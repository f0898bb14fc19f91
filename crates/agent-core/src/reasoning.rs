//! Turn Driver
//!
//! The tool-augmented turn every backend runs:
//!
//! 1. completion with tools enabled, first reply recorded as `assistant`
//! 2. each requested tool call dispatched in order through the session
//! 3. if anything was called, a synthesis completion without tools,
//!    recorded as `assistant_final`
//!
//! Tool failures are recorded and fed back as `ERROR: ...` text; only
//! backend failures end the turn early.

use crate::error::{AgentError, Result};
use crate::message::{InteractionRecord, Message};
use crate::provider::ChatBackend;
use crate::tool::{ToolCall, ToolOutcome, ToolRegistry, ToolSession};

/// Run one turn of `conversation` against `backend`
pub async fn run_turn<B>(
    backend: &B,
    model: &str,
    conversation: &[Message],
    tools: &ToolRegistry,
    session: &dyn ToolSession,
) -> Result<InteractionRecord>
where
    B: ChatBackend + ?Sized,
{
    let mut record = InteractionRecord::new(model);
    let wire_tools = backend.encode_tools(tools.descriptors());
    let mut working: Vec<B::Wire> = conversation
        .iter()
        .map(|m| backend.encode_message(m))
        .collect();

    tracing::info!(model, messages = working.len(), tools = wire_tools.len(), "Sending initial query");
    let first = backend
        .complete(model, &working, Some(&wire_tools))
        .await?;

    let called_tools = !first.tool_calls.is_empty();
    record.push(Message::assistant(first.content).with_tool_calls(called_tools));
    working.push(first.echo);

    for call in &first.tool_calls {
        tracing::info!(tool = %call.name, "Processing tool call");

        let feedback = match dispatch(call, tools, session).await {
            ToolOutcome::Success { arguments, output } => {
                record.push(Message::tool(&call.name, arguments, output.clone()));
                output
            }
            ToolOutcome::Failure { kind, detail } => {
                let text = format!("Error executing tool {}: {detail}", call.name);
                tracing::error!(tool = %call.name, ?kind, "{text}");
                record.push(Message::tool_error(&call.name, detail));
                format!("ERROR: {text}")
            }
        };

        working.push(backend.tool_feedback(call, &feedback));
    }

    if called_tools {
        tracing::info!(model, "Getting final response after tool calls");
        let last = backend.complete(model, &working, None).await?;
        record.push(Message::assistant_final(last.content));
    }

    Ok(record)
}

/// Resolve, validate and execute one call
pub async fn dispatch(call: &ToolCall, tools: &ToolRegistry, session: &dyn ToolSession) -> ToolOutcome {
    let arguments = call.arguments.decode();

    let arguments = match tools.validate(&call.name, arguments) {
        Ok(arguments) => arguments,
        Err(e) => return ToolOutcome::failure(&e),
    };

    tracing::debug!(tool = %call.name, args = ?arguments, "Calling tool");
    match session.call_tool(&call.name, &arguments).await {
        Ok(segments) => ToolOutcome::Success {
            arguments,
            output: segments.concat(),
        },
        Err(e) => {
            let e = match e {
                e @ (AgentError::UnknownTool(_) | AgentError::InvalidArguments { .. }) => e,
                other => AgentError::ToolExecution(other.to_string()),
            };
            ToolOutcome::failure(&e)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backend and session shared by the core tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{Map, Value};

    use super::*;
    use crate::message::Role;
    use crate::provider::BackendReply;
    use crate::tool::ToolDescriptor;

    /// What the scripted backend answers, in order
    pub enum Scripted {
        Reply(String, Vec<ToolCall>),
        Fail(String),
    }

    /// Wire message recorded by the scripted backend
    #[derive(Clone, Debug, PartialEq)]
    pub struct WireMsg {
        pub role: String,
        pub content: String,
    }

    #[derive(Default)]
    pub struct ScriptedBackend {
        pub script: Mutex<VecDeque<Scripted>>,
        pub requests: Mutex<Vec<(Vec<WireMsg>, bool)>>,
    }

    impl ScriptedBackend {
        pub fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        type Wire = WireMsg;

        fn encode_tools(&self, tools: &[ToolDescriptor]) -> Vec<Value> {
            tools.iter().map(|t| Value::String(t.name.clone())).collect()
        }

        fn encode_message(&self, message: &Message) -> WireMsg {
            WireMsg {
                role: message.role.to_string(),
                content: message.content.clone(),
            }
        }

        async fn complete(
            &self,
            _model: &str,
            messages: &[WireMsg],
            tools: Option<&[Value]>,
        ) -> Result<BackendReply<WireMsg>> {
            self.requests
                .lock()
                .unwrap()
                .push((messages.to_vec(), tools.is_some()));
            match self.script.lock().unwrap().pop_front() {
                Some(Scripted::Reply(content, tool_calls)) => Ok(BackendReply {
                    echo: WireMsg {
                        role: "assistant".into(),
                        content: content.clone(),
                    },
                    content,
                    tool_calls,
                }),
                Some(Scripted::Fail(msg)) => Err(AgentError::BackendTransport(msg)),
                None => Err(AgentError::MalformedResponse("script exhausted".into())),
            }
        }

        fn tool_feedback(&self, call: &ToolCall, content: &str) -> WireMsg {
            WireMsg {
                role: format!("tool:{}", call.name),
                content: content.to_string(),
            }
        }
    }

    /// Session with `add`, `echo` and `status`; `explode` always fails.
    #[derive(Default)]
    pub struct CalcSession {
        pub calls: Mutex<Vec<(String, Map<String, Value>)>>,
    }

    impl CalcSession {
        pub fn descriptors() -> Vec<ToolDescriptor> {
            vec![
                ToolDescriptor::new(
                    "add",
                    "Add two numbers",
                    serde_json::json!({"type": "object", "required": ["a", "b"]}),
                ),
                ToolDescriptor::new("status", "Server status", Value::Null),
                ToolDescriptor::new("explode", "Always fails", Value::Null),
            ]
        }

        pub fn registry() -> ToolRegistry {
            ToolRegistry::from_descriptors(Self::descriptors())
        }
    }

    #[async_trait]
    impl ToolSession for CalcSession {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
            Ok(Self::descriptors())
        }

        async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<Vec<String>> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), arguments.clone()));
            match name {
                "add" => {
                    let a = arguments.get("a").and_then(Value::as_f64).unwrap_or(0.0);
                    let b = arguments.get("b").and_then(Value::as_f64).unwrap_or(0.0);
                    Ok(vec![format!("{}", a + b)])
                }
                "status" => Ok(vec!["status: ".into(), "online".into()]),
                "explode" => Err(AgentError::Other("kaboom".into())),
                other => Err(AgentError::UnknownTool(other.to_string())),
            }
        }
    }

    pub fn roles(record: &InteractionRecord) -> Vec<Role> {
        record.messages().iter().map(|m| m.role).collect()
    }
}
