use futures::StreamExt;

use crate::agent::stream::{StreamEmitter, ToolCallAccumulator};
use crate::error::Result;
use crate::llm::{CompletionRequest, CompletionResponse, FinishReason};
use crate::response::RawResponse;

use super::ConversationLoop;

impl ConversationLoop {
    /// Drain a streamed completion into one response, forwarding text deltas.
    pub(crate) async fn get_streaming_completion(
        &self,
        request: CompletionRequest,
        emitter: &mut dyn StreamEmitter,
    ) -> Result<CompletionResponse> {
        let mut stream = self.llm.complete_stream(request);
        let mut text = String::new();
        let mut accumulator = ToolCallAccumulator::new();
        let mut usage = None;
        let mut finish_reason = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;

            if !chunk.text.is_empty() {
                text.push_str(&chunk.text);
                emitter.emit_text_delta(&chunk.text).await;
            }

            if let Some(delta) = &chunk.tool_call_delta {
                accumulator.accumulate(delta);
            }

            if let Some(chunk_usage) = chunk.usage {
                usage = Some(chunk_usage);
            }

            if let Some(reason) = chunk.finish_reason {
                finish_reason = Some(reason);
            }
        }

        Ok(CompletionResponse {
            content: if text.is_empty() {
                RawResponse::Null
            } else {
                RawResponse::Text(text)
            },
            tool_calls: accumulator.finalize(),
            finish_reason: finish_reason.unwrap_or(FinishReason::Stop),
            usage,
        })
    }
}
