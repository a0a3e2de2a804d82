//! Pipe handlers: dispatcher adapters that forward an event or command
//! invocation to a remote extension's subscription channel instead of
//! calling an in-process handler.

use std::sync::Arc;

use corvus_proto::Event;

use crate::dispatch::command::{CommandEvent, PipeTarget};
use crate::rpc::subscription::SubscriptionTable;
use crate::rpc::wire::StreamItem;

fn to_stream_item(subscription_id: u64, event: &Event) -> StreamItem {
    StreamItem {
        subscription_id,
        event_name: event.name.clone(),
        network: event.network_id.clone(),
        sender: event.sender.clone(),
        args: event.args.clone(),
        unix_ts: unix_seconds(),
    }
}

/// `Unix()` seconds at the moment an event crosses into the wire format,
/// per the pipe-handler contract.
fn unix_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Forwards one registered `(network?, event)` subscription's matching
/// events into the RPC subscription table. Registered with the dispatcher
/// as an ordinary event-tier handler via `Register`.
pub fn event_pipe_handler(subs: Arc<SubscriptionTable>, event_id: String) -> impl Fn(Event) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    move |event: Event| {
        let subs = subs.clone();
        let event_id = event_id.clone();
        Box::pin(async move {
            subs.broadcast(&event_id, |sid| to_stream_item(sid, &event)).await;
        })
    }
}

/// The command-tier equivalent: implements [`PipeTarget`] so a remote
/// `RegisterCmd` registration can sit in the commands table next to
/// in-process handlers.
pub struct CommandPipe {
    subs: Arc<SubscriptionTable>,
    cmd_id: String,
}

impl CommandPipe {
    pub fn new(subs: Arc<SubscriptionTable>, cmd_id: impl Into<String>) -> CommandPipe {
        CommandPipe { subs, cmd_id: cmd_id.into() }
    }
}

impl PipeTarget for CommandPipe {
    fn forward(&self, cmd_event: &CommandEvent) {
        let subs = self.subs.clone();
        let cmd_id = self.cmd_id.clone();
        let event = cmd_event.event.clone();
        tokio::spawn(async move {
            subs.broadcast(&cmd_id, |sid| to_stream_item(sid, &event)).await;
        });
    }
}
