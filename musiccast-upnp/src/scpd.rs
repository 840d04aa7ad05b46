//! SCPD (service description) parsing and runtime action invocation.
//!
//! Rather than generating per-action bindings, the service description is
//! parsed once and actions are invoked by name against the resulting table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use musiccast_soap::SoapClient;

use crate::error::{ParseResult, ServiceCallError};
use crate::xml;

/// Parsed service control protocol description.
#[derive(Debug, Clone, PartialEq)]
pub struct Scpd {
    pub actions: Vec<Action>,
    pub state_variables: Vec<StateVariable>,
}

/// One action with its declared arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub arguments: Vec<ActionArgument>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionArgument {
    pub name: String,
    pub direction: Direction,
    pub related_state_variable: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// One state variable with its declared data type.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVariable {
    pub name: String,
    pub data_type: DataType,
}

/// UPnP data types we distinguish; everything else is treated as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Ui4,
    I4,
    String,
    Other(std::string::String),
}

impl DataType {
    fn from_str(s: &str) -> Self {
        match s {
            "ui4" | "ui2" | "ui1" => DataType::Ui4,
            "i4" | "i2" | "i1" | "int" => DataType::I4,
            "string" => DataType::String,
            other => DataType::Other(other.to_string()),
        }
    }

    /// Whether values of this type decode as integers.
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Ui4 | DataType::I4)
    }
}

impl Scpd {
    /// Parse an SCPD XML document.
    pub fn parse(scpd_xml: &str) -> ParseResult<Self> {
        let raw: raw::Scpd = xml::parse(scpd_xml)?;

        let actions = raw
            .action_list
            .actions
            .into_iter()
            .map(|a| Action {
                name: a.name,
                arguments: a
                    .argument_list
                    .arguments
                    .into_iter()
                    .map(|arg| ActionArgument {
                        name: arg.name,
                        direction: if arg.direction.eq_ignore_ascii_case("out") {
                            Direction::Out
                        } else {
                            Direction::In
                        },
                        related_state_variable: arg.related_state_variable,
                    })
                    .collect(),
            })
            .collect();

        let state_variables = raw
            .state_table
            .variables
            .into_iter()
            .map(|v| StateVariable {
                name: v.name,
                data_type: DataType::from_str(&v.data_type),
            })
            .collect();

        Ok(Scpd {
            actions,
            state_variables,
        })
    }

    /// Look up the declared data type of a state variable.
    pub fn variable_type(&self, name: &str) -> Option<&DataType> {
        self.state_variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| &v.data_type)
    }
}

/// A service bound to its control URL with an action table built from SCPD.
///
/// Actions are invoked by name; argument presence is checked against the
/// declared IN arguments before anything goes on the wire.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    client: SoapClient,
    control_url: String,
    service_type: String,
    actions: HashMap<String, Action>,
}

impl ServiceHandle {
    pub fn from_scpd(
        client: SoapClient,
        scpd: &Scpd,
        service_type: impl Into<String>,
        control_url: impl Into<String>,
    ) -> Self {
        let actions = scpd
            .actions
            .iter()
            .cloned()
            .map(|a| (a.name.clone(), a))
            .collect();
        Self {
            client,
            control_url: control_url.into(),
            service_type: service_type.into(),
            actions,
        }
    }

    /// Names of all actions the service declares.
    pub fn action_names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    /// Invoke an action by name, returning its OUT arguments.
    pub async fn invoke(
        &self,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<HashMap<String, String>, ServiceCallError> {
        let declared = self
            .actions
            .get(action)
            .ok_or_else(|| ServiceCallError::UnknownAction(action.to_string()))?;

        for arg in &declared.arguments {
            if arg.direction == Direction::In && !params.iter().any(|(n, _)| *n == arg.name) {
                return Err(ServiceCallError::MissingArgument {
                    action: action.to_string(),
                    argument: arg.name.clone(),
                });
            }
        }

        let out = self
            .client
            .call_action(&self.control_url, &self.service_type, action, params)
            .await?;
        Ok(out)
    }
}

mod raw {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Scpd {
        #[serde(rename = "actionList", default)]
        pub action_list: ActionList,
        #[serde(rename = "serviceStateTable", default)]
        pub state_table: StateTable,
    }

    #[derive(Debug, Deserialize, Default)]
    pub struct ActionList {
        #[serde(rename = "action", default)]
        pub actions: Vec<Action>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Action {
        pub name: String,
        #[serde(rename = "argumentList", default)]
        pub argument_list: ArgumentList,
    }

    #[derive(Debug, Deserialize, Default)]
    pub struct ArgumentList {
        #[serde(rename = "argument", default)]
        pub arguments: Vec<Argument>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Argument {
        pub name: String,
        #[serde(default)]
        pub direction: String,
        #[serde(rename = "relatedStateVariable", default)]
        pub related_state_variable: String,
    }

    #[derive(Debug, Deserialize, Default)]
    pub struct StateTable {
        #[serde(rename = "stateVariable", default)]
        pub variables: Vec<Variable>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Variable {
        pub name: String,
        #[serde(rename = "dataType", default)]
        pub data_type: String,
    }
}
