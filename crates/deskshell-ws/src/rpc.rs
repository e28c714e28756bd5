/*!
RPC request/response types and dispatch.
*/

#![allow(missing_docs)]

use deskshell::compositor::Toggled;
use deskshell::monitor::MonitorStatus;
use deskshell::{AppId, ResourceCounts, Shell, ShellSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use ts_rs::TS;

/// RPC request.
#[derive(Debug, Deserialize, TS)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
#[ts(export)]
pub enum RpcRequest {
  /// Get a snapshot of current state.
  Snapshot,
  /// Open an app, loading it first if needed.
  Open {
    id: AppId,
    /// Announce the opening on `system:speak`.
    #[serde(default)]
    announce: bool,
  },
  Close { id: AppId },
  /// Taskbar click.
  Toggle { id: AppId },
  Minimize { id: AppId },
  Restore { id: AppId },
  /// Bring a window to the front.
  Focus { id: AppId },
  /// Evict the least-recently-used windows regardless of memory pressure.
  ForceRelease {
    #[serde(default = "default_release_count")]
    count: usize,
  },
  MemoryStatus,
  /// Live resource counts for an app's process and window.
  ResourceCount { id: AppId },
}

const fn default_release_count() -> usize {
  1
}

/// RPC response.
#[derive(Debug, Serialize, TS)]
#[serde(untagged)]
#[ts(export)]
pub enum RpcResponse {
  /// Full state snapshot.
  Snapshot(Box<ShellSnapshot>),
  /// Id the app was opened under.
  Opened(AppId),
  Toggled(Toggled),
  /// Stacking order handed to a focused window.
  ZIndex(u32),
  /// Windows evicted by `force_release`.
  Released(Vec<AppId>),
  MemoryStatus(MonitorStatus),
  Resources {
    process: ResourceCounts,
    window: ResourceCounts,
  },
  /// No data.
  Null,
}

/// Parse `method`/`args` into a request and answer with `{result}` or `{error}`.
pub async fn dispatch_json(shell: &Shell, method: &str, args: &JsonValue) -> JsonValue {
  let request_value = json!({ "method": method, "args": args });

  match serde_json::from_value::<RpcRequest>(request_value) {
    Ok(request) => match dispatch(shell, request).await {
      Ok(response) => json!({ "result": response }),
      Err(e) => {
        log::warn!("[rpc] {method} failed: {e}");
        json!({ "error": e })
      }
    },
    Err(e) => {
      log::warn!("[rpc] Invalid request for {method}: {e}");
      json!({ "error": format!("Invalid request: {}", e) })
    }
  }
}

/// Run one request against the shell.
pub async fn dispatch(shell: &Shell, request: RpcRequest) -> Result<RpcResponse, String> {
  let compositor = shell.compositor();
  match request {
    RpcRequest::Snapshot => Ok(RpcResponse::Snapshot(Box::new(shell.snapshot()))),

    RpcRequest::Open { id, announce } => {
      let opened = compositor
        .open(id, announce)
        .await
        .map_err(|e| e.to_string())?;
      Ok(RpcResponse::Opened(opened))
    }

    RpcRequest::Close { id } => {
      compositor.close(&id).await.map_err(|e| e.to_string())?;
      Ok(RpcResponse::Null)
    }

    RpcRequest::Toggle { id } => {
      let toggled = compositor.toggle(&id).await.map_err(|e| e.to_string())?;
      Ok(RpcResponse::Toggled(toggled))
    }

    RpcRequest::Minimize { id } => {
      compositor.minimize(&id).map_err(|e| e.to_string())?;
      Ok(RpcResponse::Null)
    }

    RpcRequest::Restore { id } => {
      compositor.restore(&id).map_err(|e| e.to_string())?;
      Ok(RpcResponse::Null)
    }

    RpcRequest::Focus { id } => {
      let z_index = compositor.bring_to_front(&id).map_err(|e| e.to_string())?;
      Ok(RpcResponse::ZIndex(z_index))
    }

    RpcRequest::ForceRelease { count } => {
      let released = shell.monitor().force_release(count).await;
      Ok(RpcResponse::Released(released))
    }

    RpcRequest::MemoryStatus => Ok(RpcResponse::MemoryStatus(shell.monitor().get_status())),

    RpcRequest::ResourceCount { id } => Ok(RpcResponse::Resources {
      process: shell.ledger().resource_count(&id),
      window: shell.registry().resource_count(&id),
    }),
  }
}
