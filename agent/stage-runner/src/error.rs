use snafu::Snafu;
use std::fmt::{Debug, Display, Formatter};

/// The `Error` type for a failed stage. Errors returned by a stage body are passed through,
/// preserving their type. A stage body that panics is reported with the panic message. Errors
/// originating with the [`Pipeline`](crate::Pipeline) itself are of the [`PipelineError`] type.
#[derive(Debug)]
pub enum Error<E>
where
    E: Debug + Display + Send + Sync + 'static,
{
    /// An error originating from the [`Pipeline`](crate::Pipeline).
    Pipeline(PipelineError),
    /// A stage body panicked.
    Panic(String),
    /// An error returned by a stage body.
    Stage(E),
}

impl<E> std::error::Error for Error<E> where E: Debug + Display + Send + Sync + 'static {}

impl<E> Display for Error<E>
where
    E: Debug + Display + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Pipeline(e) => write!(f, "pipeline error: {}", e),
            Error::Panic(message) => write!(f, "stage panicked: {}", message),
            Error::Stage(e) => Display::fmt(e, f),
        }
    }
}

/// An error that has originated with the [`Pipeline`](crate::Pipeline).
#[derive(Debug, Snafu)]
pub struct PipelineError(InnerError);

/// The private error type, [`PipelineError`] is opaque. `InnerError` is the underlying error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum InnerError {
    #[snafu(display("Stage '{}' was registered more than once", name))]
    DuplicateStage { name: String },

    #[snafu(display("Invalid stage name '{}': {}", name, source))]
    StageName {
        name: String,
        source: elk_test_model::Error,
    },
}

impl<E> From<InnerError> for Error<E>
where
    E: Debug + Display + Send + Sync + 'static,
{
    fn from(e: InnerError) -> Self {
        Error::Pipeline(e.into())
    }
}
