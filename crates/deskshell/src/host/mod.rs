/*!
Host integration: the traits the core talks through and a reference
implementation driven by an explicit event loop.
*/

mod event_loop;
mod memory;
mod traits;

pub use event_loop::{LoopHost, SurfaceState};
pub use memory::{StaticMemoryProbe, UnsupportedMemoryProbe};
pub use traits::{
  Host, ListenerFn, ListenerOptions, MemoryProbe, MemoryUsage, SurfaceSpec, SurfaceUpdate, TaskFn,
  TickFn, UiEvent,
};
