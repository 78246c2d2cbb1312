// SPDX-License-Identifier: BSD-3-Clause
use std::fmt::Debug;
use std::time::{Duration, SystemTime};

use tracing::field::{Field, Visit};
use tracing::span::Attributes;
use tracing::{Id, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

/// The `name` field of a span, e.g. the function being walked.
#[derive(Debug, Default)]
struct SpanLabel(String);

impl Visit for SpanLabel {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "name" {
            self.0 = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "name" {
            self.0 = format!("{:?}", value);
        }
    }
}

/// Prints how long every span was entered, in nanoseconds, to stderr.
#[derive(Debug, Default)]
pub struct NanoCountLayer;

impl<S> Layer<S> for NanoCountLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let mut label = SpanLabel::default();
            attrs.record(&mut label);
            span.extensions_mut().insert(label);
        }
    }

    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().replace(SystemTime::now());
        }
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let extensions = span.extensions();
            if let Some(time) = extensions.get::<SystemTime>() {
                let elapsed = time.elapsed().unwrap_or(Duration::ZERO);
                match extensions.get::<SpanLabel>() {
                    Some(SpanLabel(label)) if !label.is_empty() => {
                        eprintln!("{} {}: {}", span.name(), label, elapsed.as_nanos())
                    }
                    _ => eprintln!("{}: {}", span.name(), elapsed.as_nanos()),
                }
            }
        }
    }
}
