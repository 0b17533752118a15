macro_rules! feature {
    (
        #![$meta:meta]
        $($item:item)*
    ) => {
        $(
            #[cfg($meta)]
            #[cfg_attr(docsrs, doc(cfg($meta)))]
            $item
        )*
    }
}

/// Logs from test code, tagging the event so it can be told apart from the
/// crate's own diagnostics.
#[cfg(test)]
#[allow(unused_macros)]
macro_rules! test_info {
    ($($arg:tt)+) => {
        tracing::info!(target: "hypha::test", $($arg)+);
    };
}
