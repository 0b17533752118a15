#[allow(unused_imports)]
pub(crate) use self::inner::*;

#[cfg(loom)]
mod inner {
    #![allow(unused_imports)]

    pub(crate) use loom::{model, thread};

    pub(crate) mod sync {
        pub(crate) use loom::sync::*;
    }
}

#[cfg(not(loom))]
mod inner {
    #![allow(dead_code, unused_imports)]

    pub(crate) mod sync {
        pub(crate) use alloc::sync::Arc;
        pub(crate) use core::sync::atomic;
    }

    #[cfg(any(test, feature = "std"))]
    pub(crate) mod thread {
        pub(crate) use std::thread::{yield_now, JoinHandle};

        /// Spawns a thread that inherits the test's `tracing` dispatcher, so
        /// that its events show up in the test output.
        #[cfg(test)]
        pub(crate) fn spawn<F, T>(f: F) -> JoinHandle<T>
        where
            F: FnOnce() -> T,
            F: Send + 'static,
            T: Send + 'static,
        {
            let dispatch = tracing::dispatcher::get_default(|current| current.clone());
            std::thread::spawn(move || {
                let _guard = tracing::dispatcher::set_default(&dispatch);
                test_info!("thread spawned");
                f()
            })
        }
    }

    #[cfg(test)]
    pub(crate) fn model(f: impl Fn()) {
        let _trace = crate::test_util::trace_init();
        f()
    }
}
