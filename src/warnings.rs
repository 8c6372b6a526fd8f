use std::sync::atomic::{AtomicBool, Ordering};

use crate::active_messaging::HandlerId;
use crate::config;
use crate::pipe::PipeId;

static ENABLED: AtomicBool = AtomicBool::new(true);

pub(crate) enum RuntimeWarning {
    CallbackReuse(PipeId),
    PendingMessages(usize, Vec<HandlerId>),
    ProgressTimeout(f64),
}

impl RuntimeWarning {
    pub(crate) fn enable_warnings() {
        ENABLED.store(true, Ordering::Relaxed);
    }
    pub(crate) fn disable_warnings() {
        ENABLED.store(false, Ordering::Relaxed);
    }
    fn print_warning(&self) -> bool {
        if ENABLED.load(Ordering::Relaxed) {
            match self {
                RuntimeWarning::CallbackReuse(_) => config().callback_reuse_warning.unwrap_or(true),
                RuntimeWarning::PendingMessages(_, _) => {
                    config().pending_msgs_warning.unwrap_or(true)
                }
                RuntimeWarning::ProgressTimeout(elapsed) => {
                    config().deadlock_timeout > 0.0 && *elapsed > config().deadlock_timeout
                }
            }
        } else {
            false
        }
    }

    #[cfg(feature = "runtime-warnings-panic")]
    fn panic(&self, msg: &str) {
        match self {
            RuntimeWarning::ProgressTimeout(_) => {}
            _ => panic!("{msg}
                Note this warning causes a panic because you have compiled active-messenger with the `runtime-warnings-panic` feature.
                Recompile without this feature to only print warnings, rather than panic.
                To disable runtime warnings completely, recompile with the `disable-runtime-warnings` feature."),
        }
    }

    pub(crate) fn print(self) {
        #[cfg(not(feature = "disable-runtime-warnings"))]
        if self.print_warning() {
            let msg = match &self {
                RuntimeWarning::CallbackReuse(pipe) => {
                    format!("[AM WARNING] callback on non-persistent pipe {pipe:?} has been triggered more than once.
                    Non-persistent callbacks are expected to fire at most once, create the pipe with persist=true for repeated triggers.
                    Set AM_CALLBACK_REUSE_WARNING=0 to disable this warning.")
                }
                RuntimeWarning::PendingMessages(cnt, handlers) => {
                    format!("[AM WARNING] dropping a messenger with {cnt} message(s) still buffered for unregistered handlers {handlers:?}.
                    These messages will never be delivered. Set AM_PENDING_MSGS_WARNING=0 to disable this warning.")
                }
                RuntimeWarning::ProgressTimeout(elapsed) => {
                    format!("[AM WARNING][{:?}] progress loop has not completed after {elapsed:.1} seconds. Potential deadlock detected.
                    The deadlock timeout can be set via the AM_DEADLOCK_TIMEOUT environment variable, the current timeout is {} seconds, setting this to 0 will disable this warning.",
                        std::thread::current().id(), config().deadlock_timeout)
                }
            };

            #[cfg(feature = "runtime-warnings-panic")]
            self.panic(&msg);
            tracing::warn!("{msg}");
        }
    }
}
