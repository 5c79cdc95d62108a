// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Thin logging front end.
//!
//! A [`Logger`] is owned by the application's composition root and handed to call sites by
//! reference. It renders the message, captures the call site and thread, and hands the
//! record to the flush service without waiting. With no sink attached every call is a
//! no-op.

use crate::entry::{ContextValue, EntryRecord, Level};
use crate::flush_service::FlushHandle;
use std::fmt::Display;
use std::panic::Location;
use std::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Logger {
    sink: RwLock<Option<FlushHandle>>,
}

impl Logger {
    pub fn new(sink: FlushHandle) -> Self {
        Self {
            sink: RwLock::new(Some(sink)),
        }
    }

    pub fn set_sink(&self, sink: FlushHandle) {
        *self.sink.write().unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }

    pub fn clear_sink(&self) {
        *self.sink.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn has_sink(&self) -> bool {
        self.sink.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    #[track_caller]
    pub fn verbose(&self, tag: &str, message: impl Display, context: Option<ContextValue>) {
        self.log_caller(Level::Verbose, tag, message, context, Location::caller());
    }

    #[track_caller]
    pub fn debug(&self, tag: &str, message: impl Display, context: Option<ContextValue>) {
        self.log_caller(Level::Debug, tag, message, context, Location::caller());
    }

    #[track_caller]
    pub fn info(&self, tag: &str, message: impl Display, context: Option<ContextValue>) {
        self.log_caller(Level::Info, tag, message, context, Location::caller());
    }

    #[track_caller]
    pub fn warning(&self, tag: &str, message: impl Display, context: Option<ContextValue>) {
        self.log_caller(Level::Warning, tag, message, context, Location::caller());
    }

    #[track_caller]
    pub fn error(&self, tag: &str, message: impl Display, context: Option<ContextValue>) {
        self.log_caller(Level::Error, tag, message, context, Location::caller());
    }

    fn log_caller(
        &self,
        level: Level,
        tag: &str,
        message: impl Display,
        context: Option<ContextValue>,
        location: &Location<'_>,
    ) {
        self.log(level, tag, message, location.file(), "", location.line(), context);
    }

    /// Hands one entry to the sink. Used directly by the [`ship!`](crate::ship) macro,
    /// which also knows the enclosing module path.
    #[allow(clippy::too_many_arguments)]
    pub fn log(
        &self,
        level: Level,
        tag: &str,
        message: impl Display,
        file: &str,
        function: &str,
        line: u32,
        context: Option<ContextValue>,
    ) {
        let sink = self.sink.read().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(sink) = sink else {
            return;
        };

        let record = EntryRecord::new(level, tag, message.to_string())
            .with_location(file, function, line)
            .with_thread(current_thread_name())
            .with_context(context);
        if sink.submit(record).is_err() {
            debug!("Flush service is gone, dropping log entry");
        }
    }
}

/// Logs through a [`Logger`], capturing file, line and module path.
///
/// ```ignore
/// ship!(logger, Level::Info, "NET", "connected to {}", addr);
/// ship!(logger, Level::Error, "NET", context: ContextValue::from("retry"), "lost {}", addr);
/// ```
#[macro_export]
macro_rules! ship {
    ($logger:expr, $level:expr, $tag:expr, context: $context:expr, $($arg:tt)+) => {
        $logger.log(
            $level,
            $tag,
            format_args!($($arg)+),
            file!(),
            module_path!(),
            line!(),
            Some($context),
        )
    };
    ($logger:expr, $level:expr, $tag:expr, $($arg:tt)+) => {
        $logger.log(
            $level,
            $tag,
            format_args!($($arg)+),
            file!(),
            module_path!(),
            line!(),
            None,
        )
    };
}

/// Empty on the main thread, otherwise the thread's name or, failing that, its id.
pub fn current_thread_name() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some("main") => String::new(),
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{:?}", thread.id()),
    }
}
