//! WDMP command model: deduction and validation.
//!
//! An inbound HTTP request (method, path variables, query string, sync
//! headers, body) is turned into exactly one [`Command`]:
//!
//! | Method   | Command                                                  |
//! |----------|----------------------------------------------------------|
//! | `GET`    | `GET`, or `GET_ATTRIBUTES` when `attributes` is non-empty |
//! | `PATCH`  | `SET`, `SET_ATTRIBUTES` or `TEST_AND_SET`                |
//! | `DELETE` | `DELETE_ROW` (row = `parameter` path variable)           |
//! | `PUT`    | `REPLACE_ROWS` (table = `parameter`, rows from body)     |
//! | `POST`   | `ADD_ROW` (table = `parameter`, row from body)           |
//!
//! Everything here is pure. Every failure is a [`WdmpError`], which always
//! renders as `400 Bad Request`.

use std::collections::BTreeMap;

use axum::http::{HeaderMap, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::GatewayError;

pub const HEADER_SYNC_OLD_CID: &str = "X-Webpa-Sync-Old-Cid";
pub const HEADER_SYNC_NEW_CID: &str = "X-Webpa-Sync-New-Cid";
pub const HEADER_SYNC_CMC: &str = "X-Webpa-Sync-Cmc";

/// Content type of a serialized WDMP command inside a WRP envelope.
pub const WDMP_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WdmpError {
    #[error("names parameter is required")]
    EmptyNames,
    #[error("invalid service")]
    InvalidService,
    #[error("invalid SET message")]
    InvalidSet,
    #[error("new-cid is required for TEST_AND_SET")]
    NewCidRequired,
    #[error("table property is required")]
    MissingTable,
    #[error("row property is required")]
    MissingRow,
    #[error("row property is invalid")]
    InvalidRow,
    #[error("rows property is required")]
    MissingRows,
    #[error("rows property is invalid")]
    InvalidRows,
    #[error("payload is invalid")]
    InvalidPayload,
    #[error("unsupported method, could not decode request payload")]
    UnsupportedMethod,
}

impl From<WdmpError> for GatewayError {
    fn from(err: WdmpError) -> Self {
        GatewayError::bad_request(err)
    }
}

/// Path variables of a device route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathVars {
    #[serde(default)]
    pub version: String,
    pub deviceid: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub parameter: Option<String>,
}

/// Query string of a translation `GET`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranslationQuery {
    pub names: Option<String>,
    pub attributes: Option<String>,
}

/// One entry of a `SET`-family parameter list.
///
/// A parameter is either value-style (`dataType` and `value`) or
/// attribute-style (`attributes` only). A request may not mix the two.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetParameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "dataType", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<i8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
}

impl SetParameter {
    fn has_name(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.is_empty())
    }

    fn is_value_style(&self) -> bool {
        self.data_type.is_some_and(|t| t >= 0) && self.value.is_some() && self.attributes.is_none()
    }

    fn is_attribute_style(&self) -> bool {
        self.attributes.is_some() && self.data_type.is_none() && self.value.is_none()
    }
}

/// A single table row: column name to value.
pub type Row = BTreeMap<String, String>;

/// A validated WDMP command. Serializes with the `command` tag first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    #[serde(rename = "GET")]
    Get { names: Vec<String> },
    #[serde(rename = "GET_ATTRIBUTES")]
    GetAttributes { names: Vec<String>, attributes: String },
    #[serde(rename = "SET")]
    Set { parameters: Vec<SetParameter> },
    #[serde(rename = "SET_ATTRIBUTES")]
    SetAttributes { parameters: Vec<SetParameter> },
    #[serde(rename = "TEST_AND_SET")]
    TestAndSet {
        #[serde(rename = "old-cid", default, skip_serializing_if = "String::is_empty")]
        old_cid: String,
        #[serde(rename = "new-cid", default, skip_serializing_if = "String::is_empty")]
        new_cid: String,
        #[serde(rename = "sync-cmc", default, skip_serializing_if = "String::is_empty")]
        sync_cmc: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        parameters: Vec<SetParameter>,
    },
    #[serde(rename = "ADD_ROW")]
    AddRow { table: String, row: Row },
    #[serde(rename = "DELETE_ROW")]
    DeleteRow { row: String },
    #[serde(rename = "REPLACE_ROWS")]
    ReplaceRows { table: String, rows: BTreeMap<String, Row> },
}

impl Command {
    /// Wire name of the command, as carried in the `command` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Get { .. } => "GET",
            Self::GetAttributes { .. } => "GET_ATTRIBUTES",
            Self::Set { .. } => "SET",
            Self::SetAttributes { .. } => "SET_ATTRIBUTES",
            Self::TestAndSet { .. } => "TEST_AND_SET",
            Self::AddRow { .. } => "ADD_ROW",
            Self::DeleteRow { .. } => "DELETE_ROW",
            Self::ReplaceRows { .. } => "REPLACE_ROWS",
        }
    }

    /// JSON bytes placed in the WRP payload.
    pub fn to_payload(&self) -> Result<Vec<u8>, GatewayError> {
        serde_json::to_vec(self).map_err(GatewayError::internal)
    }
}

/// Reject services outside the configured allow-list.
pub fn check_service(service: &str, supported: &[String]) -> Result<(), WdmpError> {
    if supported.iter().any(|s| s == service) {
        Ok(())
    } else {
        Err(WdmpError::InvalidService)
    }
}

/// Deduce and validate the command for one translation request.
pub fn decode(
    method: &Method,
    vars: &PathVars,
    query: &TranslationQuery,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Command, WdmpError> {
    match *method {
        Method::GET => deduce_get(query.names.as_deref(), query.attributes.as_deref()),
        Method::PATCH => deduce_set(headers, body),
        Method::DELETE => deduce_delete_row(vars.parameter.as_deref()),
        Method::PUT => deduce_replace_rows(vars.parameter.as_deref(), body),
        Method::POST => deduce_add_row(vars.parameter.as_deref(), body),
        _ => Err(WdmpError::UnsupportedMethod),
    }
}

pub fn deduce_get(names: Option<&str>, attributes: Option<&str>) -> Result<Command, WdmpError> {
    let names: Vec<String> = names
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .collect();
    if names.is_empty() {
        return Err(WdmpError::EmptyNames);
    }

    match attributes.map(str::trim).filter(|a| !a.is_empty()) {
        Some(attributes) => Ok(Command::GetAttributes {
            names,
            attributes: attributes.to_string(),
        }),
        None => Ok(Command::Get { names }),
    }
}

#[derive(Deserialize)]
struct SetBody {
    #[serde(default)]
    parameters: Vec<SetParameter>,
}

pub fn deduce_set(headers: &HeaderMap, body: &[u8]) -> Result<Command, WdmpError> {
    let old_cid = header_str(headers, HEADER_SYNC_OLD_CID);
    let new_cid = header_str(headers, HEADER_SYNC_NEW_CID);
    let sync_cmc = header_str(headers, HEADER_SYNC_CMC);

    // A sync cannot be half specified.
    if new_cid.is_empty() && !old_cid.is_empty() {
        return Err(WdmpError::NewCidRequired);
    }

    let parameters = if body.trim_ascii().is_empty() {
        Vec::new()
    } else {
        serde_json::from_slice::<SetBody>(body)
            .map_err(|_| WdmpError::InvalidPayload)?
            .parameters
    };

    let command = if !new_cid.is_empty() {
        Command::TestAndSet {
            old_cid,
            new_cid,
            sync_cmc,
            parameters,
        }
    } else if parameters.first().is_some_and(|p| {
        p.attributes.is_some() && p.name.is_some() && p.data_type.is_none() && p.value.is_none()
    }) {
        Command::SetAttributes { parameters }
    } else {
        Command::Set { parameters }
    };

    validate_set(&command)?;
    Ok(command)
}

/// Check every parameter of a `SET`-family command against the command's
/// shape. `TEST_AND_SET` may carry no parameters, but those it carries still
/// need names and may not mix value and attribute styles.
pub fn validate_set(command: &Command) -> Result<(), WdmpError> {
    let parameters = match command {
        Command::Set { parameters }
        | Command::SetAttributes { parameters }
        | Command::TestAndSet { parameters, .. } => parameters,
        _ => return Ok(()),
    };
    let accepts = |p: &SetParameter| match command {
        Command::Set { .. } => p.is_value_style(),
        Command::SetAttributes { .. } => p.is_attribute_style(),
        _ => true,
    };

    if parameters.is_empty() && !matches!(command, Command::TestAndSet { .. }) {
        return Err(WdmpError::InvalidSet);
    }
    let mixed = parameters.iter().any(SetParameter::is_value_style)
        && parameters.iter().any(SetParameter::is_attribute_style);
    if !mixed && parameters.iter().all(|p| p.has_name() && accepts(p)) {
        Ok(())
    } else {
        Err(WdmpError::InvalidSet)
    }
}

pub fn deduce_delete_row(parameter: Option<&str>) -> Result<Command, WdmpError> {
    let row = parameter.map(str::trim).unwrap_or_default();
    if row.is_empty() {
        return Err(WdmpError::MissingRow);
    }
    Ok(Command::DeleteRow {
        row: row.to_string(),
    })
}

pub fn deduce_replace_rows(parameter: Option<&str>, body: &[u8]) -> Result<Command, WdmpError> {
    let table = table_name(parameter)?;
    if body.trim_ascii().is_empty() {
        return Err(WdmpError::MissingRows);
    }
    let rows: BTreeMap<String, Row> =
        serde_json::from_slice(body).map_err(|_| WdmpError::InvalidRows)?;
    if rows.is_empty() {
        return Err(WdmpError::MissingRows);
    }
    if rows.values().any(BTreeMap::is_empty) {
        return Err(WdmpError::InvalidRows);
    }
    Ok(Command::ReplaceRows { table, rows })
}

pub fn deduce_add_row(parameter: Option<&str>, body: &[u8]) -> Result<Command, WdmpError> {
    let table = table_name(parameter)?;
    if body.trim_ascii().is_empty() {
        return Err(WdmpError::MissingRow);
    }
    let row: Row = serde_json::from_slice(body).map_err(|_| WdmpError::InvalidRow)?;
    if row.is_empty() {
        return Err(WdmpError::MissingRow);
    }
    Ok(Command::AddRow { table, row })
}

fn table_name(parameter: Option<&str>) -> Result<String, WdmpError> {
    match parameter.map(str::trim) {
        Some(table) if !table.is_empty() => Ok(table.to_string()),
        _ => Err(WdmpError::MissingTable),
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};
    use serde_json::json;

    fn sync_headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_static(value),
            );
        }
        headers
    }

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn test_get_payload_shape() {
        let command = deduce_get(Some("p1,p2"), None).unwrap();
        let payload = String::from_utf8(command.to_payload().unwrap()).unwrap();
        assert_eq!(payload, r#"{"command":"GET","names":["p1","p2"]}"#);
    }

    #[test]
    fn test_get_with_attributes() {
        let command = deduce_get(Some("p1"), Some("notify")).unwrap();
        assert_eq!(
            command,
            Command::GetAttributes {
                names: vec!["p1".into()],
                attributes: "notify".into()
            }
        );
    }

    #[test]
    fn test_get_blank_attributes_is_plain_get() {
        let command = deduce_get(Some("p1"), Some("")).unwrap();
        assert_eq!(command.name(), "GET");
    }

    #[test]
    fn test_get_requires_names() {
        assert_eq!(deduce_get(None, None), Err(WdmpError::EmptyNames));
        assert_eq!(deduce_get(Some(""), None), Err(WdmpError::EmptyNames));
        assert_eq!(deduce_get(Some(" , "), None), Err(WdmpError::EmptyNames));
    }

    #[test]
    fn test_set_from_value_parameters() {
        let raw = body(json!({"parameters": [
            {"name": "a", "dataType": 0, "value": "x"},
            {"name": "b", "dataType": 2, "value": 3}
        ]}));
        let command = deduce_set(&HeaderMap::new(), &raw).unwrap();
        assert_eq!(command.name(), "SET");
    }

    #[test]
    fn test_set_attributes_from_attribute_parameters() {
        let raw = body(json!({"parameters": [
            {"name": "a", "attributes": {"notify": 1}},
            {"name": "b", "attributes": {"notify": 0}}
        ]}));
        let command = deduce_set(&HeaderMap::new(), &raw).unwrap();
        assert_eq!(command.name(), "SET_ATTRIBUTES");
    }

    #[test]
    fn test_set_mixed_parameters_rejected() {
        let value_first = body(json!({"parameters": [
            {"name": "a", "dataType": 0, "value": "x"},
            {"name": "b", "attributes": {"notify": 0}}
        ]}));
        let attrs_first = body(json!({"parameters": [
            {"name": "b", "attributes": {"notify": 0}},
            {"name": "a", "dataType": 0, "value": "x"}
        ]}));
        assert_eq!(
            deduce_set(&HeaderMap::new(), &value_first),
            Err(WdmpError::InvalidSet)
        );
        assert_eq!(
            deduce_set(&HeaderMap::new(), &attrs_first),
            Err(WdmpError::InvalidSet)
        );
    }

    #[test]
    fn test_set_parameter_field_checks() {
        let cases = [
            json!({"parameters": [{"dataType": 0, "value": "x"}]}),
            json!({"parameters": [{"name": "", "dataType": 0, "value": "x"}]}),
            json!({"parameters": [{"name": "a", "value": "x"}]}),
            json!({"parameters": [{"name": "a", "dataType": 0}]}),
            json!({"parameters": [{"name": "a", "dataType": -1, "value": "x"}]}),
            json!({"parameters": [{"name": "a", "dataType": 0, "value": "x", "attributes": {}}]}),
        ];
        for case in cases {
            assert_eq!(
                deduce_set(&HeaderMap::new(), &body(case.clone())),
                Err(WdmpError::InvalidSet),
                "{case}"
            );
        }
    }

    #[test]
    fn test_set_empty_parameters_rejected() {
        assert_eq!(
            deduce_set(&HeaderMap::new(), &body(json!({"parameters": []}))),
            Err(WdmpError::InvalidSet)
        );
        assert_eq!(deduce_set(&HeaderMap::new(), b""), Err(WdmpError::InvalidSet));
    }

    #[test]
    fn test_set_unparsable_body() {
        assert_eq!(
            deduce_set(&HeaderMap::new(), b"{not json"),
            Err(WdmpError::InvalidPayload)
        );
    }

    #[test]
    fn test_new_cid_forces_test_and_set() {
        let headers = sync_headers(&[(HEADER_SYNC_NEW_CID, "1234"), (HEADER_SYNC_CMC, "256")]);
        let raw = body(json!({"parameters": [{"name": "a", "attributes": {"notify": 1}}]}));
        let command = deduce_set(&headers, &raw).unwrap();
        assert_eq!(
            command,
            Command::TestAndSet {
                old_cid: String::new(),
                new_cid: "1234".into(),
                sync_cmc: "256".into(),
                parameters: vec![SetParameter {
                    name: Some("a".into()),
                    attributes: Some(json!({"notify": 1}).as_object().cloned().unwrap()),
                    ..SetParameter::default()
                }],
            }
        );
    }

    #[test]
    fn test_new_cid_with_empty_list() {
        let headers = sync_headers(&[(HEADER_SYNC_NEW_CID, "1234")]);
        assert_eq!(deduce_set(&headers, b"").unwrap().name(), "TEST_AND_SET");
        assert_eq!(
            deduce_set(&headers, &body(json!({"parameters": []})))
                .unwrap()
                .name(),
            "TEST_AND_SET"
        );
    }

    #[test]
    fn test_test_and_set_rejects_mixed_styles() {
        let headers = sync_headers(&[(HEADER_SYNC_NEW_CID, "1234")]);
        let mixed = body(json!({"parameters": [
            {"name": "a", "dataType": 0, "value": "x"},
            {"name": "b", "attributes": {"notify": 0}},
        ]}));
        assert_eq!(deduce_set(&headers, &mixed), Err(WdmpError::InvalidSet));

        let unnamed = body(json!({"parameters": [{"dataType": 0, "value": "x"}]}));
        assert_eq!(deduce_set(&headers, &unnamed), Err(WdmpError::InvalidSet));
    }

    #[test]
    fn test_sync_cmc_alone_does_not_force_test_and_set() {
        let headers = sync_headers(&[(HEADER_SYNC_CMC, "256")]);
        assert_eq!(deduce_set(&headers, b""), Err(WdmpError::InvalidSet));

        let raw = body(json!({"parameters": [{"name": "a", "dataType": 0, "value": "x"}]}));
        assert_eq!(deduce_set(&headers, &raw).unwrap().name(), "SET");
    }

    #[test]
    fn test_test_and_set_copies_sync_headers_verbatim() {
        let headers = sync_headers(&[(HEADER_SYNC_OLD_CID, "old"), (HEADER_SYNC_NEW_CID, "new")]);
        let payload = deduce_set(&headers, b"").unwrap().to_payload().unwrap();
        let value: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(
            value,
            json!({"command": "TEST_AND_SET", "old-cid": "old", "new-cid": "new"})
        );
    }

    #[test]
    fn test_old_cid_without_new_cid() {
        let headers = sync_headers(&[(HEADER_SYNC_OLD_CID, "1234")]);
        assert_eq!(deduce_set(&headers, b""), Err(WdmpError::NewCidRequired));
        assert_eq!(deduce_set(&headers, b"garbage"), Err(WdmpError::NewCidRequired));
        let valid = body(json!({"parameters": [{"name": "a", "dataType": 0, "value": "x"}]}));
        assert_eq!(deduce_set(&headers, &valid), Err(WdmpError::NewCidRequired));
    }

    #[test]
    fn test_delete_row() {
        assert_eq!(
            deduce_delete_row(Some("Device.NAT.PortMapping.1.")),
            Ok(Command::DeleteRow {
                row: "Device.NAT.PortMapping.1.".into()
            })
        );
        assert_eq!(deduce_delete_row(None), Err(WdmpError::MissingRow));
        assert_eq!(deduce_delete_row(Some("  ")), Err(WdmpError::MissingRow));
    }

    #[test]
    fn test_replace_rows() {
        let raw = body(json!({"0": {"Name": "a"}, "1": {"Name": "b"}}));
        let command = deduce_replace_rows(Some("Table."), &raw).unwrap();
        match command {
            Command::ReplaceRows { table, rows } => {
                assert_eq!(table, "Table.");
                assert_eq!(rows.len(), 2);
                assert_eq!(rows["1"]["Name"], "b");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_replace_rows_errors() {
        let raw = body(json!({"0": {"Name": "a"}}));
        assert_eq!(deduce_replace_rows(None, &raw), Err(WdmpError::MissingTable));
        assert_eq!(deduce_replace_rows(Some(" "), &raw), Err(WdmpError::MissingTable));
        assert_eq!(deduce_replace_rows(Some("T"), b""), Err(WdmpError::MissingRows));
        assert_eq!(deduce_replace_rows(Some("T"), b"{}"), Err(WdmpError::MissingRows));
        assert_eq!(
            deduce_replace_rows(Some("T"), &body(json!({"0": {}}))),
            Err(WdmpError::InvalidRows)
        );
        assert_eq!(
            deduce_replace_rows(Some("T"), b"[1,2]"),
            Err(WdmpError::InvalidRows)
        );
    }

    #[test]
    fn test_add_row() {
        let raw = body(json!({"Enable": "true", "Name": "guest"}));
        let payload = deduce_add_row(Some("Table."), &raw)
            .unwrap()
            .to_payload()
            .unwrap();
        let value: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(
            value,
            json!({"command": "ADD_ROW", "table": "Table.", "row": {"Enable": "true", "Name": "guest"}})
        );
    }

    #[test]
    fn test_add_row_errors() {
        assert_eq!(deduce_add_row(None, b"{\"a\":\"b\"}"), Err(WdmpError::MissingTable));
        assert_eq!(deduce_add_row(Some("T"), b""), Err(WdmpError::MissingRow));
        assert_eq!(deduce_add_row(Some("T"), b"{}"), Err(WdmpError::MissingRow));
        assert_eq!(deduce_add_row(Some("T"), b"{\"a\":1}"), Err(WdmpError::InvalidRow));
    }

    #[test]
    fn test_decode_dispatches_on_method() {
        let vars = PathVars {
            deviceid: "mac:112233445566".into(),
            service: "config".into(),
            parameter: Some("Row.1.".into()),
            ..PathVars::default()
        };
        let query = TranslationQuery {
            names: Some("a".into()),
            attributes: None,
        };
        let headers = HeaderMap::new();
        assert_eq!(
            decode(&Method::GET, &vars, &query, &headers, b"").unwrap().name(),
            "GET"
        );
        assert_eq!(
            decode(&Method::DELETE, &vars, &query, &headers, b"")
                .unwrap()
                .name(),
            "DELETE_ROW"
        );
        assert_eq!(
            decode(&Method::HEAD, &vars, &query, &headers, b""),
            Err(WdmpError::UnsupportedMethod)
        );
    }

    #[test]
    fn test_check_service() {
        let supported = vec!["config".to_string()];
        assert!(check_service("config", &supported).is_ok());
        assert_eq!(
            check_service("iot", &supported),
            Err(WdmpError::InvalidService)
        );
    }

    #[test]
    fn test_command_round_trips_through_json() {
        let command = Command::ReplaceRows {
            table: "T.".into(),
            rows: BTreeMap::from([("0".into(), Row::from([("k".into(), "v".into())]))]),
        };
        let decoded: Command = serde_json::from_slice(&command.to_payload().unwrap()).unwrap();
        assert_eq!(decoded, command);
    }
}
