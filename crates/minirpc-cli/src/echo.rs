// Copyright 2025 minirpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Demo `Echo` service.
//!
//! | path          | request        | response                          |
//! |---------------|----------------|-----------------------------------|
//! | `/Echo/Say`   | `{"text": ..}` | enveloped `{"text": .., "trace_id": ..}` |
//! | `/Echo/Ping`  | any JSON       | the same JSON, not enveloped      |
//! | `/Echo/Fail`  | any JSON       | application error with code 1001  |

use minirpc_common::{CallContext, Enveloped, RpcError};
use minirpc_server::{MethodDesc, ServiceDesc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Application code returned by `/Echo/Fail`
pub const FAIL_CODE: i32 = 1001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SayRequest {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SayReply {
    pub text: String,
    pub trace_id: Option<String>,
}

async fn say(ctx: CallContext, req: SayRequest) -> minirpc_common::Result<Enveloped<SayReply>> {
    Ok(Enveloped(SayReply {
        text: req.text,
        trace_id: ctx.trace_id().map(str::to_string),
    }))
}

async fn ping(_ctx: CallContext, req: Value) -> minirpc_common::Result<Value> {
    Ok(req)
}

async fn fail(_ctx: CallContext, _req: Value) -> minirpc_common::Result<Value> {
    Err(RpcError::status(FAIL_CODE, "echo asked to fail"))
}

pub fn service() -> ServiceDesc {
    ServiceDesc::new("Echo")
        .method(MethodDesc::new("Say", say))
        .method(MethodDesc::new("Ping", ping))
        .method(MethodDesc::new("Fail", fail))
}
