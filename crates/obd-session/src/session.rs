//! Adapter Session
//!
//! Owns the live adapter link. A session answers one query at a time, turns
//! adapter nulls into [`Value::Absent`], and closes the link exactly once.

use obd_protocol::{Adapter, ObdError, QueryId, Reading};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, info_span, warn, Span};

use crate::catalog::{Parameter, ParameterKind};
use crate::error::SessionError;
use crate::record::Value;

/// Live connection to a diagnostic adapter
pub struct Session {
    adapter: Box<dyn Adapter>,
    /// Queries discovered as supported at connect time
    supported: HashSet<QueryId>,
    closed: bool,
    span: Span,
}

impl Session {
    /// Open the adapter link and discover supported queries
    pub async fn connect(adapter: Box<dyn Adapter>) -> Result<Self, SessionError> {
        Self::connect_in(adapter, &Span::current()).await
    }

    /// Open the adapter link, logging under the given parent span
    pub async fn connect_in(
        mut adapter: Box<dyn Adapter>,
        parent: &Span,
    ) -> Result<Self, SessionError> {
        let span = info_span!(parent: parent, "session", adapter = %adapter.describe());
        info!(parent: &span, "Connecting to OBD adapter");

        if let Err(err) = adapter.connect().await {
            warn!(parent: &span, "Adapter connect failed: {}", err);
            adapter.close().await;
            return Err(SessionError::Connection(err));
        }
        if !adapter.is_connected() {
            warn!(parent: &span, "Adapter reports vehicle not connected");
            adapter.close().await;
            return Err(SessionError::Connection(ObdError::VehicleNotConnected));
        }

        let supported = match adapter.supported_queries().await {
            Ok(supported) => supported,
            Err(err) => {
                adapter.close().await;
                return Err(SessionError::Connection(err));
            }
        };
        info!(parent: &span, "Connected, {} supported queries", supported.len());

        Ok(Self {
            adapter,
            supported,
            closed: false,
            span,
        })
    }

    /// Span the session logs under
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Whether the link is still open
    pub fn is_open(&self) -> bool {
        !self.closed && self.adapter.is_connected()
    }

    /// Whether the adapter reported the parameter's query as supported
    pub fn supports(&self, parameter: &Parameter) -> bool {
        // Adapter-local commands are answered by the adapter, not the vehicle
        parameter.query_id.is_adapter_local() || self.supported.contains(&parameter.query_id)
    }

    /// Query one parameter
    ///
    /// Unsupported parameters short-circuit to `Absent` without a round trip.
    pub async fn query(&mut self, parameter: &Parameter) -> Result<Value, SessionError> {
        if self.closed {
            return Err(SessionError::Connection(ObdError::Closed));
        }
        if !self.supports(parameter) {
            debug!(parent: &self.span, "{} not supported, skipping", parameter.name);
            return Ok(Value::Absent);
        }

        match self.adapter.query(&parameter.query_id).await {
            Ok(Some(reading)) => Ok(self.to_value(parameter, reading)),
            Ok(None) => {
                debug!(parent: &self.span, "{} returned no data", parameter.name);
                Ok(Value::Absent)
            }
            Err(ObdError::NotSupported(_)) => Ok(Value::Absent),
            Err(err) if err.is_link_failure() => Err(SessionError::Connection(err)),
            Err(err) => Err(SessionError::Query {
                parameter: parameter.name.clone(),
                source: err,
            }),
        }
    }

    fn to_value(&self, parameter: &Parameter, reading: Reading) -> Value {
        match (parameter.kind, reading) {
            (ParameterKind::Numeric, Reading::Number(v)) if v.is_finite() => Value::Numeric(v),
            (ParameterKind::Numeric, Reading::Number(v)) => {
                warn!(parent: &self.span, "{} returned non-finite value {}", parameter.name, v);
                Value::Absent
            }
            (ParameterKind::Numeric, Reading::Text(text)) => {
                match text.trim().parse::<f64>() {
                    Ok(v) if v.is_finite() => Value::Numeric(v),
                    _ => {
                        warn!(parent: &self.span, "{} returned non-numeric {:?}", parameter.name, text);
                        Value::Absent
                    }
                }
            }
            (ParameterKind::Text, Reading::Text(text)) => Value::Text(text),
            (ParameterKind::Text, Reading::Number(v)) => Value::Text(v.to_string()),
        }
    }

    /// Read stored trouble codes; empty when none or the adapter answers null
    pub async fn query_fault_codes(&mut self) -> Result<Vec<String>, SessionError> {
        if self.closed {
            return Err(SessionError::Connection(ObdError::Closed));
        }
        match self.adapter.read_fault_codes().await {
            Ok(codes) => {
                let codes = codes.unwrap_or_default();
                info!(parent: &self.span, "Read {} trouble codes", codes.len());
                Ok(codes)
            }
            Err(err) if err.is_link_failure() => Err(SessionError::Connection(err)),
            Err(err) => {
                warn!(parent: &self.span, "Reading trouble codes failed: {}", err);
                Ok(Vec::new())
            }
        }
    }

    /// Clear stored trouble codes
    pub async fn clear_fault_codes(&mut self) -> Result<bool, SessionError> {
        if self.closed {
            return Err(SessionError::Connection(ObdError::Closed));
        }
        match self.adapter.clear_fault_codes().await {
            Ok(()) => {
                info!(parent: &self.span, "Trouble codes cleared");
                Ok(true)
            }
            Err(err) if err.is_link_failure() => Err(SessionError::Connection(err)),
            Err(err) => {
                warn!(parent: &self.span, "Clearing trouble codes failed: {}", err);
                Ok(false)
            }
        }
    }

    /// Read informational parameters once, as text
    ///
    /// Absent and failed parameters are left out of the map.
    pub async fn vehicle_info(
        &mut self,
        parameters: &[Parameter],
    ) -> Result<BTreeMap<String, String>, SessionError> {
        let readings = self.read_current(parameters).await?;
        Ok(readings
            .into_iter()
            .filter(|(_, value)| !value.is_absent())
            .map(|(name, value)| (name, value.to_string()))
            .collect())
    }

    /// Read each parameter once
    ///
    /// Per-parameter failures are recorded as `Absent`; only a lost link fails
    /// the whole read.
    pub async fn read_current(
        &mut self,
        parameters: &[Parameter],
    ) -> Result<BTreeMap<String, Value>, SessionError> {
        let mut readings = BTreeMap::new();
        for parameter in parameters {
            let value = match self.query(parameter).await {
                Ok(value) => value,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(parent: &self.span, "{}", err);
                    Value::Absent
                }
            };
            readings.insert(parameter.name.clone(), value);
        }
        Ok(readings)
    }

    /// Release the adapter; later calls are no-ops
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.adapter.close().await;
        info!(parent: &self.span, "Session closed");
    }
}
