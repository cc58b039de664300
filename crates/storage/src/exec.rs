//! Operation shim machinery bridging the synchronous read path to async
//! callers.
//!
//! The reconstruction engine and the store adapter are synchronous; every
//! public read operation is also wanted from async contexts without tying
//! up a runtime worker on blocking I/O.  [`inst_reader_ops!`] generates a
//! type-erased handle exposing each operation in a `_blocking` variant
//! (runs on the caller's thread) and an `_async` variant (runs on a thread
//! pool, result delivered over a oneshot channel).  Dropping an `_async`
//! future abandons the receiver; the worker's late send is discarded.

use fluxdb_db::DbError;
use thiserror::Error;

/// Failures of the shim layer itself, distinct from database errors.
#[derive(Debug, Clone, Error)]
pub enum OpsError {
    /// A pool worker dropped its response channel without answering.
    #[error("worker failed strangely")]
    WorkerFailedStrangely,
}

impl From<OpsError> for DbError {
    fn from(value: OpsError) -> Self {
        match value {
            OpsError::WorkerFailedStrangely => DbError::WorkerFailedStrangely,
        }
    }
}

/// Generates the public ops handle over a read context.
///
/// For every `name(args..) => Ret` entry this expects a free function
/// `fn name<S: StateStore>(ctx: &$ctx<S>, args..) -> DbResult<Ret>` in the
/// invoking scope and emits `name_blocking` and `name_async` methods on the
/// generated `$base` struct.  The context's store type parameter is erased
/// behind an internal object-safe shim trait, so the handle itself stays
/// plain.
macro_rules! inst_reader_ops {
    {
        ($base:ident => $ctx:ident) {
            $($iname:ident($($aname:ident: $aty:ty),*) => $ret:ty;)*
        }
    } => {
        paste::paste! {
            /// Type-erased handle dispatching read operations either on the
            /// caller's thread or onto a worker pool.
            pub struct $base {
                pool: threadpool::ThreadPool,
                inner: ::std::sync::Arc<dyn ShimTrait>,
            }

            impl $base {
                pub(crate) fn new<S: fluxdb_db::StateStore>(
                    pool: threadpool::ThreadPool,
                    ctx: ::std::sync::Arc<$ctx<S>>,
                ) -> Self {
                    Self { pool, inner: ctx }
                }

                $(
                    pub fn [<$iname _blocking>](&self, $($aname: $aty),*) -> fluxdb_db::DbResult<$ret> {
                        self.inner.[<$iname _shim>]($($aname),*)
                    }

                    pub async fn [<$iname _async>](&self, $($aname: $aty),*) -> fluxdb_db::DbResult<$ret> {
                        let inner = self.inner.clone();
                        let (resp_tx, resp_rx) = tokio::sync::oneshot::channel();
                        self.pool.execute(move || {
                            let res = inner.[<$iname _shim>]($($aname),*);
                            if resp_tx.send(res).is_err() {
                                ::tracing::warn!(op = stringify!($iname), "read op response dropped");
                            }
                        });
                        match resp_rx.await {
                            Ok(res) => res,
                            Err(_) => Err($crate::exec::OpsError::WorkerFailedStrangely.into()),
                        }
                    }
                )*
            }

            trait ShimTrait: Sync + Send + 'static {
                $(
                    fn [<$iname _shim>](&self, $($aname: $aty),*) -> fluxdb_db::DbResult<$ret>;
                )*
            }

            impl<S: fluxdb_db::StateStore> ShimTrait for $ctx<S> {
                $(
                    fn [<$iname _shim>](&self, $($aname: $aty),*) -> fluxdb_db::DbResult<$ret> {
                        $iname(self, $($aname),*)
                    }
                )*
            }
        }
    };
}

pub(crate) use inst_reader_ops;
