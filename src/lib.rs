#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg, doc_cfg_hide))]
#![cfg_attr(docsrs, doc(cfg_hide(docsrs, loom)))]
#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![warn(missing_docs, missing_debug_implementations)]

extern crate alloc;

#[macro_use]
mod macros;

pub(crate) mod loom;

mod completion;
mod queue;

pub mod task;
pub mod worker;

#[doc(inline)]
pub use self::task::{Pending, Task, TaskList};
#[doc(inline)]
pub use self::worker::{Mode, Worker};

feature! {
    #![feature = "std"]
    mod error;

    #[doc(inline)]
    pub use self::error::Error;
}
