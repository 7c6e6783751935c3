//! Cancellation for blocking tunnel I/O.
//!
//! A [`Cancellation`] combines the two ways an in-flight send or receive
//! can be abandoned: a deadline fixed up front, and an imperative cancel
//! signalled from another task. Each transport I/O races against both, so
//! a pending operation unblocks promptly and reports which cause fired.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Why a cancelled operation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    Cancelled,
    DeadlineExceeded,
}

impl From<CancelCause> for Error {
    fn from(cause: CancelCause) -> Self {
        match cause {
            CancelCause::Cancelled => Error::Cancelled,
            CancelCause::DeadlineExceeded => Error::DeadlineExceeded,
        }
    }
}

/// Deadline and cancel signal for one tunnel operation.
///
/// The default value never cancels. Values are cheap to clone and carry
/// no state of their own once the operation returns; nothing needs to be
/// restored on the endpoint afterwards.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    deadline: Option<Instant>,
    token: Option<CancellationToken>,
}

impl Cancellation {
    /// An operation that can only finish or fail on its own.
    pub fn none() -> Self {
        Self::default()
    }

    /// Cancel the operation at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            token: None,
        }
    }

    /// Cancel the operation `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Cancel the operation when `token` is cancelled.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            deadline: None,
            token: Some(token),
        }
    }

    /// Add a deadline to this cancellation.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Add a cancel token to this cancellation.
    pub fn token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// The cause that has already fired, if any. An imperative cancel
    /// wins over an elapsed deadline, mirroring how the cause is chosen
    /// while an operation is in flight.
    pub fn cause(&self) -> Option<CancelCause> {
        if self.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Some(CancelCause::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(CancelCause::DeadlineExceeded);
        }
        None
    }

    /// Run one transport I/O under this cancellation.
    ///
    /// If the operation errors while a cause has already fired, the
    /// cancellation cause is reported in preference to the incidental
    /// I/O error.
    pub(crate) async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if let Some(cause) = self.cause() {
            return Err(cause.into());
        }

        let cancelled = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(fut);

        tokio::select! {
            biased;
            () = cancelled => Err(Error::Cancelled),
            () = expired => Err(Error::DeadlineExceeded),
            res = &mut fut => match res {
                Ok(value) => Ok(value),
                Err(err) => match self.cause() {
                    Some(cause) => Err(cause.into()),
                    None => Err(err),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uncancelled_passes_value_through() {
        let cancel = Cancellation::none();
        let out: i32 = cancel.run(async { Ok(42) }).await.unwrap();
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let cancel = Cancellation::with_token(token);

        let err = cancel
            .run(async { Ok(std::future::pending::<()>().await) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn token_cancel_unblocks_pending_operation() {
        let token = CancellationToken::new();
        let cancel = Cancellation::with_token(token.clone());

        let handle = tokio::spawn(async move {
            cancel
                .run(async { Ok(std::future::pending::<()>().await) })
                .await
        });
        token.cancel();
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn deadline_expiry_reports_deadline_cause() {
        let cancel = Cancellation::with_timeout(Duration::from_millis(10));
        let err = cancel
            .run(async { Ok(std::future::pending::<()>().await) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded));
    }

    #[tokio::test]
    async fn cancel_cause_wins_over_incidental_error() {
        let token = CancellationToken::new();
        token.cancel();
        let cancel = Cancellation::none().token(token);

        // The operation itself fails, but the token already fired.
        let err = cancel
            .run(async {
                Err::<(), _>(Error::Io(std::io::Error::from(
                    std::io::ErrorKind::BrokenPipe,
                )))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn cause_prefers_imperative_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        let cancel = Cancellation {
            deadline: Some(Instant::now()),
            token: Some(token),
        };
        assert_eq!(cancel.cause(), Some(CancelCause::Cancelled));
    }
}
