//! RPC Method Dispatch
//!
//! Maps method names to facade operations. Parameters are positional; trailing
//! parameters may be omitted where the method defines a default.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use super::types::{RpcRequest, RpcResponse};
use crate::error::{SocketError, SocketResult};
use crate::facade::SocketFacade;

/// Resolves RPC requests against a [`SocketFacade`]
#[derive(Clone)]
pub struct Dispatcher {
    facade: Arc<SocketFacade>,
    default_wait_timeout: Duration,
}

impl Dispatcher {
    pub fn new(facade: Arc<SocketFacade>, default_wait_timeout: Duration) -> Self {
        Self {
            facade,
            default_wait_timeout,
        }
    }

    pub fn facade(&self) -> &Arc<SocketFacade> {
        &self.facade
    }

    /// Run one request, folding any failure into the response's `error`
    pub async fn handle(&self, request: RpcRequest) -> RpcResponse {
        debug!("RPC {} with {} params", request.method, request.params.len());
        match self.call(&request.method, &request.params).await {
            Ok(result) => RpcResponse::ok(request.id, result),
            Err(e) => RpcResponse::err(request.id, format!("{}: {}", request.method, e)),
        }
    }

    /// Invoke `method` with positional `params`
    pub async fn call(&self, method: &str, params: &[Value]) -> SocketResult<Value> {
        let p = Params { values: params };
        let facade = &self.facade;

        match method {
            "bluetoothSocketConnBeginConnectThreadUuid" => {
                p.arity(2)?;
                facade
                    .begin_connect_uuid(&p.string(0, "address")?, &p.string(1, "uuid")?)
                    .await?;
                Ok(Value::Null)
            }
            "bluetoothSocketConnBeginConnectThreadPsm" => {
                p.arity(4)?;
                let psm = u16::try_from(p.unsigned(2, "psm")?)
                    .map_err(|_| SocketError::InvalidArgument("psm out of range".to_string()))?;
                facade
                    .begin_connect_psm(
                        &p.string(0, "address")?,
                        p.boolean(1, "isBle")?,
                        psm,
                        p.boolean(3, "securedConn")?,
                    )
                    .await?;
                Ok(Value::Null)
            }
            "bluetoothSocketConnBeginAcceptThreadUuid" => {
                p.arity(2)?;
                let timeout = p.unsigned_or(1, "timeout", 0)?;
                facade.begin_accept_uuid(&p.string(0, "uuid")?, timeout).await?;
                Ok(Value::Null)
            }
            "bluetoothSocketConnBeginAcceptThreadPsm" => {
                p.arity(3)?;
                facade
                    .begin_accept_psm(
                        p.unsigned_or(0, "timeout", 0)?,
                        p.boolean_or(1, "isBle", false)?,
                        p.boolean_or(2, "securedConn", false)?,
                    )
                    .await?;
                Ok(Value::Null)
            }
            "bluetoothSocketConnGetPsm" => {
                p.arity(0)?;
                Ok(json!(facade.psm().await?))
            }
            "bluetoothSocketConnActiveConnections" => {
                p.arity(0)?;
                Ok(json!(facade.active_connections().await))
            }
            "bluetoothSocketConnWrite" => {
                p.arity(2)?;
                facade
                    .write(&p.string(0, "ascii")?, &p.string_or(1, "connID", "")?)
                    .await?;
                Ok(Value::Null)
            }
            "bluetoothSocketConnWriteBinary" => {
                p.arity(2)?;
                facade
                    .write_binary(&p.string(0, "base64")?, &p.string_or(1, "connID", "")?)
                    .await?;
                Ok(Value::Null)
            }
            "bluetoothSocketConnRead" => {
                p.arity(1)?;
                Ok(json!(facade.read(None, &p.string_or(0, "connID", "")?).await?))
            }
            "bluetoothSocketConnReadBinary" => {
                p.arity(2)?;
                let buffer_size =
                    p.unsigned_or(0, "bufferSize", facade.config().default_buffer_size as u64)?;
                let data = facade
                    .read_binary(Some(buffer_size as usize), &p.string_or(1, "connID", "")?)
                    .await?;
                Ok(json!(data))
            }
            "bluetoothSocketConnReadLine" => {
                p.arity(1)?;
                Ok(json!(facade.read_line(&p.string_or(0, "connID", "")?).await?))
            }
            "bluetoothSocketConnReadReady" => {
                p.arity(1)?;
                Ok(json!(facade.read_ready(&p.string_or(0, "connID", "")?).await?))
            }
            "bluetoothSocketConnStop" => {
                p.arity(1)?;
                facade.stop(&p.string_or(0, "connID", "")?).await?;
                Ok(Value::Null)
            }
            "bluetoothSocketConnEndConnectThread" => {
                p.arity(0)?;
                facade.end_connect_worker().await;
                Ok(Value::Null)
            }
            "bluetoothSocketConnEndAcceptThread" => {
                p.arity(0)?;
                facade.end_accept_worker().await;
                Ok(Value::Null)
            }
            "bluetoothSocketConnKillConnThread" => {
                p.arity(0)?;
                facade.kill_workers().await;
                Ok(Value::Null)
            }
            "bluetoothConnectionThroughputSend" => {
                p.arity(3)?;
                let rate = facade
                    .throughput_send(
                        p.unsigned(0, "numBuffers")? as usize,
                        p.unsigned(1, "bufferSize")? as usize,
                        &p.string_or(2, "connID", "")?,
                    )
                    .await?;
                Ok(json!(rate))
            }
            "bluetoothConnectionThroughputRead" => {
                p.arity(3)?;
                let rate = facade
                    .throughput_read(
                        p.unsigned(0, "numBuffers")? as usize,
                        p.unsigned(1, "bufferSize")? as usize,
                        &p.string_or(2, "connID", "")?,
                    )
                    .await?;
                Ok(json!(rate))
            }
            "eventPoll" => {
                p.arity(1)?;
                let number = p.unsigned_or(0, "number", 1)? as usize;
                Ok(json!(facade.events().poll(number)))
            }
            "eventWaitFor" => {
                p.arity(2)?;
                let default_ms = self.default_wait_timeout.as_millis() as u64;
                let timeout = Duration::from_millis(p.unsigned_or(1, "timeout", default_ms)?);
                let event = facade
                    .events()
                    .wait_for(&p.string(0, "eventName")?, timeout)
                    .await?;
                Ok(json!(event))
            }
            "eventClearBuffer" => {
                p.arity(0)?;
                Ok(json!(facade.events().clear()))
            }
            _ => Err(SocketError::InvalidArgument(format!("Unknown method '{}'", method))),
        }
    }
}

/// Positional parameter access
struct Params<'a> {
    values: &'a [Value],
}

impl Params<'_> {
    fn arity(&self, max: usize) -> SocketResult<()> {
        if self.values.len() > max {
            return Err(SocketError::InvalidArgument(format!(
                "expected at most {} params, got {}",
                max,
                self.values.len()
            )));
        }
        Ok(())
    }

    /// Parameter `index`, treating JSON null as absent
    fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index).filter(|value| !value.is_null())
    }

    fn missing(name: &str) -> SocketError {
        SocketError::InvalidArgument(format!("missing required param '{}'", name))
    }

    fn mistyped(name: &str, expected: &str) -> SocketError {
        SocketError::InvalidArgument(format!("param '{}' must be {}", name, expected))
    }

    fn string(&self, index: usize, name: &str) -> SocketResult<String> {
        match self.get(index) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(Self::mistyped(name, "a string")),
            None => Err(Self::missing(name)),
        }
    }

    fn string_or(&self, index: usize, name: &str, default: &str) -> SocketResult<String> {
        match self.get(index) {
            None => Ok(default.to_string()),
            Some(_) => self.string(index, name),
        }
    }

    fn unsigned(&self, index: usize, name: &str) -> SocketResult<u64> {
        match self.get(index) {
            Some(value) => value
                .as_u64()
                .ok_or_else(|| Self::mistyped(name, "a non-negative integer")),
            None => Err(Self::missing(name)),
        }
    }

    fn unsigned_or(&self, index: usize, name: &str, default: u64) -> SocketResult<u64> {
        match self.get(index) {
            None => Ok(default),
            Some(_) => self.unsigned(index, name),
        }
    }

    fn boolean(&self, index: usize, name: &str) -> SocketResult<bool> {
        match self.get(index) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(Self::mistyped(name, "a boolean")),
            None => Err(Self::missing(name)),
        }
    }

    fn boolean_or(&self, index: usize, name: &str, default: bool) -> SocketResult<bool> {
        match self.get(index) {
            None => Ok(default),
            Some(_) => self.boolean(index, name),
        }
    }
}
