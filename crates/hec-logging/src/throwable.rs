// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Conversion of raised errors into serializable [`ThrowableInfo`] trees.
//!
//! A [`Throwable`] is anything that can describe itself as a class name, an
//! optional message, a list of stack frames and an optional cause. Three
//! implementations are provided:
//!
//! - [`RaisedError`], which captures a backtrace when it is constructed
//! - [`anyhow::Error`], which carries whatever backtrace anyhow captured
//! - [`ErrorSource`], a view over any `std::error::Error` source chain
//!
//! [`ThrowableInfo::build`] walks the cause chain, removes the frames a cause
//! shares with its enclosing error and stops at the first cause it has already
//! visited.

use std::backtrace::Backtrace;
use std::collections::HashSet;
use std::error::Error;
use std::fmt;

/// Serializable description of an error and its causes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrowableInfo {
    pub class_name: String,
    pub message: Option<String>,
    /// Most recent call first.
    pub stack_frames: Vec<String>,
    pub cause: Option<Box<ThrowableInfo>>,
}

/// An error that can be described as a [`ThrowableInfo`].
pub trait Throwable {
    fn class_name(&self) -> String;

    fn message(&self) -> Option<String>;

    /// Frames captured when the error was raised, most recent call first.
    fn stack_frames(&self) -> Vec<String>;

    fn cause(&self) -> Option<Box<dyn Throwable + '_>>;

    /// Address of the underlying error object. Two views of the same error
    /// must report the same identity.
    fn identity(&self) -> usize;
}

impl<T: Throwable + ?Sized> Throwable for &T {
    fn class_name(&self) -> String {
        (**self).class_name()
    }

    fn message(&self) -> Option<String> {
        (**self).message()
    }

    fn stack_frames(&self) -> Vec<String> {
        (**self).stack_frames()
    }

    fn cause(&self) -> Option<Box<dyn Throwable + '_>> {
        (**self).cause()
    }

    fn identity(&self) -> usize {
        (**self).identity()
    }
}

impl ThrowableInfo {
    /// Builds the info tree for `throwable`. `None` in, `None` out.
    #[must_use]
    pub fn build(throwable: Option<&dyn Throwable>) -> Option<ThrowableInfo> {
        let throwable = throwable?;
        let mut visited = HashSet::new();
        Some(build_node(throwable, &mut visited))
    }

    /// Builds the info tree for a `std::error::Error` and its sources.
    #[must_use]
    pub fn from_error(error: &(dyn Error + 'static)) -> ThrowableInfo {
        let source = ErrorSource(error);
        let mut visited = HashSet::new();
        build_node(&source, &mut visited)
    }

    /// Number of links in the cause chain, including `self`.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.cause.as_ref().map_or(0, |c| c.depth())
    }
}

fn build_node(throwable: &dyn Throwable, visited: &mut HashSet<usize>) -> ThrowableInfo {
    visited.insert(throwable.identity());
    let stack_frames = throwable.stack_frames();

    let cause = match throwable.cause() {
        Some(cause) if !visited.contains(&cause.identity()) => {
            let mut info = build_node(&*cause, visited);
            info.stack_frames = trim_common_suffix(&stack_frames, info.stack_frames);
            Some(Box::new(info))
        }
        _ => None,
    };

    ThrowableInfo {
        class_name: throwable.class_name(),
        message: throwable.message(),
        stack_frames,
        cause,
    }
}

/// Drops the frames `frames` shares with the tail of `enclosing`. A non-empty
/// list keeps at least its first frame.
pub(crate) fn trim_common_suffix(enclosing: &[String], mut frames: Vec<String>) -> Vec<String> {
    let common = frames
        .iter()
        .rev()
        .zip(enclosing.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let keep = (frames.len() - common).max(1).min(frames.len());
    frames.truncate(keep);
    frames
}

/// An error value that records its stack at construction.
#[derive(Debug)]
pub struct RaisedError {
    class_name: String,
    message: Option<String>,
    frames: Vec<String>,
    cause: Option<Box<RaisedError>>,
}

impl RaisedError {
    /// Raises a new error. The first captured frame is the caller of `new`.
    #[inline(never)]
    #[must_use]
    pub fn new(class_name: impl Into<String>, message: Option<String>) -> Self {
        RaisedError {
            class_name: class_name.into(),
            message,
            frames: capture_frames(),
            cause: None,
        }
    }

    #[must_use]
    pub fn with_cause(mut self, cause: RaisedError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    #[must_use]
    pub fn frames(&self) -> &[String] {
        &self.frames
    }
}

impl fmt::Display for RaisedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.class_name, message),
            None => write!(f, "{}", self.class_name),
        }
    }
}

impl Error for RaisedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn Error + 'static))
    }
}

impl Throwable for RaisedError {
    fn class_name(&self) -> String {
        self.class_name.clone()
    }

    fn message(&self) -> Option<String> {
        self.message.clone()
    }

    fn stack_frames(&self) -> Vec<String> {
        self.frames.clone()
    }

    fn cause(&self) -> Option<Box<dyn Throwable + '_>> {
        self.cause
            .as_deref()
            .map(|c| Box::new(c) as Box<dyn Throwable + '_>)
    }

    fn identity(&self) -> usize {
        (self as *const Self).cast::<()>() as usize
    }
}

/// View over a `std::error::Error` and its `source()` chain. These errors
/// carry no frames.
#[derive(Clone, Copy)]
pub struct ErrorSource<'a>(pub &'a (dyn Error + 'static));

impl Throwable for ErrorSource<'_> {
    fn class_name(&self) -> String {
        error_class_name(self.0, "Error")
    }

    fn message(&self) -> Option<String> {
        Some(self.0.to_string())
    }

    fn stack_frames(&self) -> Vec<String> {
        Vec::new()
    }

    fn cause(&self) -> Option<Box<dyn Throwable + '_>> {
        self.0
            .source()
            .map(|s| Box::new(ErrorSource(s)) as Box<dyn Throwable + '_>)
    }

    fn identity(&self) -> usize {
        (self.0 as *const (dyn Error + 'static)).cast::<()>() as usize
    }
}

impl Throwable for anyhow::Error {
    fn class_name(&self) -> String {
        let inner: &(dyn Error + 'static) = self.as_ref();
        error_class_name(inner, "anyhow::Error")
    }

    fn message(&self) -> Option<String> {
        Some(self.to_string())
    }

    fn stack_frames(&self) -> Vec<String> {
        parse_backtrace(&self.backtrace().to_string())
    }

    fn cause(&self) -> Option<Box<dyn Throwable + '_>> {
        let inner: &(dyn Error + 'static) = self.as_ref();
        inner
            .source()
            .map(|s| Box::new(ErrorSource(s)) as Box<dyn Throwable + '_>)
    }

    fn identity(&self) -> usize {
        let inner: &(dyn Error + 'static) = self.as_ref();
        (inner as *const (dyn Error + 'static)).cast::<()>() as usize
    }
}

/// Best-effort class name for a type-erased error.
///
/// Known types are named by downcast. Anything else uses the leading
/// identifier of its `Debug` output (`ParseIntError { .. }` gives
/// `ParseIntError`), unless that is a variant-like generic word such as
/// `Error` or `Custom`, in which case `fallback` is returned.
fn error_class_name(error: &(dyn Error + 'static), fallback: &str) -> String {
    if let Some(raised) = error.downcast_ref::<RaisedError>() {
        return raised.class_name.clone();
    }
    if let Some(name) = known_class_name(error) {
        return name.to_string();
    }

    let debug = format!("{error:?}");
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    if name.is_empty() || GENERIC_DEBUG_NAMES.contains(&name.as_str()) {
        fallback.to_string()
    } else {
        name
    }
}

const GENERIC_DEBUG_NAMES: &[&str] = &["Error", "Custom", "Os", "Kind", "Simple", "SimpleMessage"];

fn known_class_name(error: &(dyn Error + 'static)) -> Option<&'static str> {
    macro_rules! known {
        ($($ty:ty => $name:literal),+ $(,)?) => {
            $(if error.is::<$ty>() {
                return Some($name);
            })+
        };
    }
    known!(
        std::io::Error => "std::io::Error",
        fmt::Error => "std::fmt::Error",
        std::num::ParseIntError => "std::num::ParseIntError",
        std::num::ParseFloatError => "std::num::ParseFloatError",
        std::num::TryFromIntError => "std::num::TryFromIntError",
        std::str::Utf8Error => "std::str::Utf8Error",
        std::string::FromUtf8Error => "std::string::FromUtf8Error",
        serde_json::Error => "serde_json::Error",
        reqwest::Error => "reqwest::Error",
        crate::errors::HecError => "hec_logging::HecError",
        crate::errors::ConfigError => "hec_logging::ConfigError",
    );
    None
}

#[inline(never)]
fn capture_frames() -> Vec<String> {
    let trace = Backtrace::force_capture();
    let frames = parse_backtrace(&trace.to_string());
    let internal = frames
        .iter()
        .take(16)
        .rposition(|f| is_capture_frame(f))
        .map_or(0, |i| i + 1);
    frames.into_iter().skip(internal).collect()
}

fn is_capture_frame(frame: &str) -> bool {
    frame.starts_with("std::backtrace")
        || frame.contains("throwable::capture_frames")
        || frame.contains("throwable::RaisedError::new")
}

/// Turns the textual form of a backtrace into `symbol (file:line:col)` frames.
pub(crate) fn parse_backtrace(text: &str) -> Vec<String> {
    let mut frames: Vec<String> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(location) = trimmed.strip_prefix("at ") {
            if let Some(last) = frames.last_mut() {
                last.push_str(" (");
                last.push_str(location);
                last.push(')');
            }
            continue;
        }
        let symbol = match trimmed.split_once(": ") {
            Some((index, symbol)) if index.chars().all(|c| c.is_ascii_digit()) => symbol,
            _ => trimmed,
        };
        if symbol == "disabled backtrace" || symbol == "unsupported backtrace" {
            continue;
        }
        frames.push(symbol.to_string());
    }
    frames
}
