//! Tracing layers
//!
//! [`NodeContextLayer`] copies the active [`NodeContextGuard`] onto every
//! new span, so later consumers can tell which node a span belongs to even
//! when the span itself records no `node_id`.

use tracing::{Subscriber, span};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::config::JsonConfig;
use crate::context::{NodeContextData, NodeContextGuard};

/// Layer attaching node context to spans
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeContextLayer;

impl NodeContextLayer {
    pub fn new() -> Self {
        Self
    }
}

/// Span extension holding the node context at span creation
#[derive(Debug, Clone)]
pub struct NodeContextExtension {
    pub data: NodeContextData,
}

impl<S> Layer<S> for NodeContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };

        // Inherit from the parent span when no guard is active
        let data = NodeContextGuard::current().or_else(|| {
            span.parent().and_then(|parent| {
                parent
                    .extensions()
                    .get::<NodeContextExtension>()
                    .map(|ext| ext.data.clone())
            })
        });

        if let Some(data) = data {
            span.extensions_mut().insert(NodeContextExtension { data });
        }
    }
}

/// JSON lines formatting layer
pub fn json_layer<S, W>(writer: W, config: &JsonConfig) -> tracing_subscriber::fmt::Layer<S, JsonFields, Format<Json>, W>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(config.flatten_events)
        .with_current_span(config.include_current_span)
        .with_span_list(config.include_span_list)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_writer(writer)
}
