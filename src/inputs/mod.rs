//! Input collaborators. They only ever call `EventQueue::push`.

pub mod console;
