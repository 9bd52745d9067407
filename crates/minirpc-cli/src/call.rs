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

//! One-shot calls for `minirpc call`.

use anyhow::{anyhow, Result};
use minirpc_client::{Client, ClientConfig, ClientOptions, InvokeOption};
use minirpc_common::{CallContext, Enveloped, Metadata};
use serde_json::Value;
use std::time::Duration;

/// A single call as described on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub addr: String,
    pub path: String,
    pub data: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub expected_code: i32,
    pub envelope: bool,
    pub timeout_ms: u64,
}

/// Parses a `key=value` header argument.
pub fn parse_header(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("invalid header '{}': expected key=value", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("invalid header '{}': empty key", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parses the `-d` argument as JSON.
pub fn parse_data(raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|raw| serde_json::from_str(raw).map_err(|e| anyhow!("invalid JSON in data: {}", e)))
        .transpose()
}

/// Performs the call and returns the decoded result.
///
/// With `envelope` set the response is decoded through an envelope and only
/// its `data` is returned.
pub async fn run(req: CallRequest) -> Result<Value> {
    if !req.path.starts_with('/') {
        return Err(anyhow!("invalid path '{}': must start with '/'", req.path));
    }

    let config = ClientConfig::from_env().with_timeout_ms(req.timeout_ms);
    let client = Client::new("cli", req.addr.as_str(), ClientOptions::new().with_config(config)).await?;

    let metadata: Metadata = req.headers.iter().map(|(k, v)| (k, v.clone())).collect();
    let opts = [
        InvokeOption::metadata(metadata),
        InvokeOption::expected_code(req.expected_code),
    ];
    let ctx = CallContext::new();

    let value = if req.envelope {
        let reply: Enveloped<Value> = client
            .invoke(&ctx, &req.path, req.data.as_ref(), &opts)
            .await?;
        reply.0
    } else {
        client
            .invoke::<Value, Value>(&ctx, &req.path, req.data.as_ref(), &opts)
            .await?
    };
    Ok(value)
}
