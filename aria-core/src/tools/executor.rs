//! ToolExecutor — runs local handlers when the model requests a function
//! call.
//!
//! Ordinary tools are awaited and their result submitted in-session.
//! Streaming tools run as tracked background tasks, each yielded chunk
//! becoming a short spoken progress update. Every failure path still
//! publishes `AssistantReceivedToolCallResult` so the state machine never
//! hangs in ToolCalling.

use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::events::bus::{EventArg, EventBus, Handler};
use crate::events::{EventData, VoiceAssistantEvent};
use crate::session::manager::MessageManager;
use crate::tools::registry::ToolRegistry;
use crate::tools::{
    FunctionCallItem, FunctionCallResult, SpecialToolParameters, Tool, ToolHandler, ToolInvocation,
    ToolOutput,
};

/// Instruction attached to error results so the model relays the failure
const ERROR_RESPONSE_INSTRUCTION: &str =
    "This is an error message that should be communicated to the user.";

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    manager: Arc<MessageManager>,
    specials: Arc<SpecialToolParameters>,
    bus: Arc<EventBus>,
    /// Streaming-tool tasks, tracked so shutdown can cancel them between
    /// yields without corrupting the outbound queue
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        manager: Arc<MessageManager>,
        specials: Arc<SpecialToolParameters>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            manager,
            specials,
            bus,
            background_tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn subscribe(self: &Arc<Self>, bus: &EventBus) {
        let executor = self.clone();
        bus.subscribe(
            VoiceAssistantEvent::AssistantStartedToolCall,
            Handler::async1(move |arg| {
                let executor = executor.clone();
                async move {
                    if let EventArg::Data(EventData::FunctionCall(item)) = arg {
                        executor.handle_tool_call(item).await;
                    }
                    Ok(())
                }
            }),
        );
    }

    pub async fn handle_tool_call(self: &Arc<Self>, item: FunctionCallItem) {
        let name = item.name.clone().unwrap_or_default();
        info!("Executing tool: {name} (call_id: {})", item.call_id);

        let Some(tool) = self.registry.get(&name) else {
            self.fail(&item, format!("Tool '{name}' not found in registry"))
                .await;
            return;
        };

        // Spoken heads-up before potentially slow work
        if let Some(message) = &tool.execution_message {
            self.manager.send_generator_update(message.clone()).await;
        }

        // Every declared special must be resolvable before the handler runs
        for special in tool.schema.special_params() {
            if !self.specials.is_available(special) {
                self.fail(
                    &item,
                    format!("Required special parameter '{special}' is not available"),
                )
                .await;
                return;
            }
        }

        let invocation = ToolInvocation {
            arguments: item.arguments.clone(),
            specials: self.specials.clone(),
        };

        match &tool.handler {
            ToolHandler::Function(f) => match f(invocation).await {
                Ok(output) => self.submit_result(&item, &tool, output).await,
                Err(e) => self.fail(&item, e).await,
            },
            ToolHandler::Streaming(_) => self.spawn_streaming(tool.clone(), item, invocation),
        }
    }

    async fn submit_result(&self, item: &FunctionCallItem, tool: &Tool, output: ToolOutput) {
        info!("Tool '{}' executed successfully", tool.name);
        let result = FunctionCallResult {
            tool_name: tool.name.clone(),
            call_id: item.call_id.clone(),
            output,
            response_instruction: tool.response_instruction.clone(),
        };
        self.manager.send_tool_result(result).await;
        self.publish_finished().await;
    }

    /// Run a streaming tool in the background, forwarding each yielded chunk
    /// as a progress update. The task is tracked and cancelled on shutdown.
    fn spawn_streaming(
        self: &Arc<Self>,
        tool: Arc<Tool>,
        item: FunctionCallItem,
        invocation: ToolInvocation,
    ) {
        let executor = self.clone();
        let handle = tokio::spawn(async move {
            let ToolHandler::Streaming(f) = &tool.handler else {
                return;
            };
            info!("Starting streaming tool execution: {}", tool.name);
            match f(invocation).await {
                Ok(mut stream) => {
                    while let Some(chunk) = stream.next().await {
                        debug!("Streaming tool yielded: {chunk}");
                        executor.manager.send_generator_update(chunk).await;
                    }
                    info!("Streaming tool '{}' completed", tool.name);
                }
                Err(e) => executor.fail(&item, e).await,
            }
        });

        let mut tasks = self.background_tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Convert any failure into an error result the model can relay, and
    /// still publish the finished event.
    async fn fail(&self, item: &FunctionCallItem, message: String) {
        error!("Tool call failed: {message}");
        let result = FunctionCallResult {
            tool_name: item.name.clone().unwrap_or_else(|| "unknown".to_string()),
            call_id: item.call_id.clone(),
            output: ToolOutput::Text(format!("Error: {message}")),
            response_instruction: Some(ERROR_RESPONSE_INSTRUCTION.to_string()),
        };
        self.manager.send_tool_result(result).await;
        self.publish_finished().await;
    }

    async fn publish_finished(&self) {
        debug!("Publishing tool call result event");
        self.bus
            .publish_async(VoiceAssistantEvent::AssistantReceivedToolCallResult, None)
            .await;
    }

    /// Abort tracked streaming tasks. Cancellation lands between yields, so
    /// the outbound queue stays consistent.
    pub fn shutdown(&self) {
        let mut tasks = self.background_tasks.lock();
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}
