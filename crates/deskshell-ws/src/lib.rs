/*!
Deskshell JSON-RPC over WebSocket.

Clients connect to `/ws`, receive a `sync:init` event carrying the shell
snapshot, then every bus event as `{"event", "data"}`. Requests are
`{id, method, args}` and are answered with `{id, result}` or `{id, error}`.
*/

mod rpc;
mod server;

pub use rpc::{dispatch, dispatch_json, RpcRequest, RpcResponse};
pub use server::{start_server, CustomRpcHandler, WebSocketState, DEFAULT_WS_PORT, SYNC_INIT_TOPIC};
