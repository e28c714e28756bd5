/*! Core types for the shell.

Regenerate TypeScript types: `cargo test -p deskshell export_bindings`
*/

#![allow(missing_docs)]

mod app;
mod error;
mod event;
mod geometry;
mod ids;
mod window;

pub use app::{AppKind, AppMetadata, AppPatch, AppRecord};
pub use error::{LoadError, ShellError, ShellResult};
pub use event::{topics, AppOpened, AppRef, AppRenamed, BusEvent, DragFinished, Speak, WindowFocused};
pub use geometry::{Point, Position};
pub use ids::{
  AppId, ConnectionId, ElementRef, ListenerHandle, SubscriptionId, SurfaceId, TickHandle,
  TimerHandle,
};
pub use window::WindowRecord;

/// Boxed, sendable future used at async trait seams.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
