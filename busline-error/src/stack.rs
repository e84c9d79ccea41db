use std::{fmt, panic::Location, sync::Arc};

use crate::{ErrorExt, LogLevel, StatusCode};

/// Ошибка фасада клиента: доменная ошибка и кадры контекста, добавленные
/// по пути от компонента к вызывающему коду.
#[derive(Clone)]
pub struct StackError {
    root: Arc<dyn ErrorExt>,
    frames: Vec<Frame>,
}

/// Кадр контекста: что делал клиент и где был добавлен кадр.
#[derive(Debug, Clone)]
pub struct Frame {
    pub message: String,
    pub location: &'static Location<'static>,
}

/// Добавление контекста к `Result` с доменной ошибкой.
pub trait ResultExt<T> {
    fn context(
        self,
        message: impl Into<String>,
    ) -> Result<T, StackError>;
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            root: Arc::new(err),
            frames: Vec::new(),
        }
    }

    /// Добавляет внешний кадр контекста.
    #[track_caller]
    pub fn context(
        mut self,
        message: impl Into<String>,
    ) -> Self {
        self.frames.push(Frame {
            message: message.into(),
            location: Location::caller(),
        });
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.root.status_code()
    }

    pub fn client_message(&self) -> String {
        self.root.client_message()
    }

    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    /// Метки доменной ошибки плюс самый внешний контекст.
    pub fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = self.root.metrics_tags();
        if let Some(outer) = self.frames.last() {
            tags.push(("context", outer.message.clone()));
        }
        tags
    }

    pub fn root(&self) -> &dyn ErrorExt {
        self.root.as_ref()
    }

    /// Кадры контекста от внутреннего к внешнему.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn downcast_ref<T: ErrorExt>(&self) -> Option<&T> {
        self.root.as_any().downcast_ref::<T>()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StackError
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let frames: Vec<String> = self
            .frames
            .iter()
            .map(|fr| format!("{} ({}:{})", fr.message, fr.location.file(), fr.location.line()))
            .collect();
        f.debug_struct("StackError")
            .field("root", &self.root.to_string())
            .field("status_code", &self.status_code())
            .field("frames", &frames)
            .finish()
    }
}

/// Внешний контекст идёт первым: `connect: open bus connection: <ошибка>`.
impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for frame in self.frames.iter().rev() {
            write!(f, "{}: ", frame.message)?;
        }
        write!(f, "{}", self.root)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.root.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

impl<T, E: ErrorExt> ResultExt<T> for Result<T, E> {
    #[track_caller]
    fn context(
        self,
        message: impl Into<String>,
    ) -> Result<T, StackError> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(StackError::new(e).context(message)),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
