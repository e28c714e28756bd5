/*!
Deskshell - lifecycle core of a browser-hosted virtual desktop.

Windows are apps; apps are processes. The core keeps every callback an app
schedules on a ledger so closing a window reliably releases it, evicts the
least-recently-used window under memory pressure, and manages stacking, focus,
dragging and lazy loading of windows.

```ignore
use deskshell::{Shell, host::LoopHost, store::MemoryStore};

let host = Arc::new(LoopHost::new());
let shell = Shell::builder()
    .host(host.clone())
    .store(Arc::new(MemoryStore::new()))
    .build();

// Processes get a sandboxed context; everything it hands out is tracked
let ctx = shell.ledger().get_context("clock");
ctx.set_interval(Duration::from_secs(1), || tick())?;

// Windows
shell.compositor().open("clock", true).await?;
shell.compositor().bring_to_front(&"clock".into())?;

// Events
let mut events = shell.subscribe();
while let Ok(event) = events.recv().await {
    // handle event
}

// Releases every timer the clock scheduled
shell.compositor().close(&"clock".into()).await?;
```
*/

mod isolate;
mod resources;

pub mod bus;
pub mod compositor;
pub mod config;
pub mod host;
pub mod ledger;
pub mod loader;
pub mod monitor;
pub mod registry;
pub mod store;

mod shell;
mod types;

pub use types::*;

pub use crate::bus::EventBus;
pub use crate::compositor::Compositor;
pub use crate::config::ShellConfig;
pub use crate::ledger::{ProcessContext, ProcessLedger};
pub use crate::monitor::MemoryMonitor;
pub use crate::registry::{WindowRegistry, WindowResources};
pub use crate::resources::{Connection, ReleaseReport, ResourceCounts};
pub use crate::shell::{ProcessSummary, Shell, ShellBuilder, ShellSnapshot};
