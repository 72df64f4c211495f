use std::fs;
use std::path::PathBuf;

use mlua::{Function, Table, Value};
use rustc_hash::FxHashMap;
use tracing::{debug, error};

use crate::http::{Request, Response};
use crate::script::{coerce_to_string, lua_to_json, LuaRequest};
use crate::status::StatusCode;

const SCRIPT_MIME_TYPE: &str = "application/json";
const RESOURCE_MIME_TYPE: &str = "application/text";

/// The result of invoking an endpoint: either a final response, or a new
/// request to be resolved in this one's place (an internal redirect, never
/// visible to the client).
#[derive(Debug)]
pub enum Outcome {
    Respond(Response),
    Redirect(Request),
}

/// A failure constructing one endpoint from its definition table. Reported
/// by the loader; never aborts loading of the remaining definitions.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("Endpoint name must be a string")]
    InvalidName,
    #[error("Endpoint type must be a string")]
    MissingType,
    #[error("Unknown endpoint type '{0}'")]
    UnknownType(String),
    #[error("{0}: mime type must be a string or nil")]
    InvalidMimeType(String),
    #[error("{0}: handler or handlers must be declared for scripts")]
    MissingHandlers(String),
    #[error("{0}: operation '{1}' must map to a function")]
    InvalidHandler(String, String),
    #[error("{0}: Resource path must be a string")]
    InvalidPath(String),
    #[error("{0}: Redirect name must be a string")]
    InvalidTarget(String),
    #[error("{0}: Request Mutator must be a function or nil")]
    InvalidMutator(String),
    #[error(transparent)]
    Lua(#[from] mlua::Error),
}

/// A named unit of request-handling behavior.
pub enum Endpoint {
    Script(ScriptEndpoint),
    Resource(ResourceEndpoint),
    Alias(AliasEndpoint),
}

impl Endpoint {
    /// Build an endpoint from a definition table, selected by its `type`
    /// discriminator.
    pub fn from_definition(definition: &Table) -> Result<Endpoint, DefinitionError> {
        let kind = match definition.get::<Value>("type")? {
            Value::String(s) => s.to_string_lossy().to_string(),
            _ => return Err(DefinitionError::MissingType),
        };

        match kind.trim().to_lowercase().as_str() {
            "script" => ScriptEndpoint::from_definition(definition).map(Endpoint::Script),
            "resource" => ResourceEndpoint::from_definition(definition).map(Endpoint::Resource),
            "alias" => AliasEndpoint::from_definition(definition).map(Endpoint::Alias),
            other => Err(DefinitionError::UnknownType(other.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Endpoint::Script(endpoint) => &endpoint.name,
            Endpoint::Resource(endpoint) => &endpoint.name,
            Endpoint::Alias(endpoint) => &endpoint.name,
        }
    }

    pub fn handle(&self, request: &Request) -> Outcome {
        match self {
            Endpoint::Script(endpoint) => endpoint.handle(request),
            Endpoint::Resource(endpoint) => endpoint.handle(request),
            Endpoint::Alias(endpoint) => endpoint.handle(request),
        }
    }
}

fn required_name(definition: &Table) -> Result<String, DefinitionError> {
    match definition.get::<Value>("name")? {
        Value::String(s) => Ok(s.to_string_lossy().to_string()),
        _ => Err(DefinitionError::InvalidName),
    }
}

fn optional_mime_type(
    definition: &Table,
    name: &str,
    default: &str,
) -> Result<String, DefinitionError> {
    match definition.get::<Value>("mimetype")? {
        Value::Nil => Ok(default.to_string()),
        Value::String(s) => Ok(s.to_string_lossy().to_string()),
        _ => Err(DefinitionError::InvalidMimeType(name.to_string())),
    }
}

/// The 500 every script-level fault collapses to. Detail goes to the log,
/// never to the client.
fn script_fault() -> Outcome {
    Outcome::Respond(Response::with_body(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Could not execute script",
    ))
}

/// A scripted handler evaluated by the embedded Lua runtime.
///
/// Handlers are selected by the `operation` query parameter. A single
/// `handler` function serves only requests without the parameter; a
/// `handlers` table serves only named operations.
pub struct ScriptEndpoint {
    name: String,
    mime_type: String,
    operations: FxHashMap<String, Function>,
    default: Option<Function>,
}

impl ScriptEndpoint {
    fn from_definition(definition: &Table) -> Result<ScriptEndpoint, DefinitionError> {
        let name = required_name(definition)?;
        let mime_type = optional_mime_type(definition, &name, SCRIPT_MIME_TYPE)?;

        let mut operations = FxHashMap::default();
        let mut default = None;

        match definition.get::<Value>("handler")? {
            Value::Function(function) => default = Some(function),
            _ => match definition.get::<Value>("handlers")? {
                Value::Table(handlers) => {
                    for pair in handlers.pairs::<Value, Value>() {
                        let (key, value) = pair?;
                        let operation = coerce_to_string(&key)
                            .unwrap_or_else(|| key.type_name().to_string());
                        match value {
                            Value::Function(function) => {
                                operations.insert(operation, function);
                            }
                            _ => return Err(DefinitionError::InvalidHandler(name, operation)),
                        }
                    }
                }
                _ => return Err(DefinitionError::MissingHandlers(name)),
            },
        }

        Ok(ScriptEndpoint {
            name,
            mime_type,
            operations,
            default,
        })
    }

    fn handle(&self, request: &Request) -> Outcome {
        let operation = request.query_value("operation");
        let handler = match operation {
            Some(op) => self.operations.get(op),
            None => self.default.as_ref(),
        };

        let Some(handler) = handler else {
            return Outcome::Respond(Response::with_body(
                StatusCode::UNAUTHORIZED,
                format!("Could not find operation '{}'", operation.unwrap_or("nil")),
            ));
        };

        match self.invoke(handler, request) {
            Ok(response) => Outcome::Respond(response),
            Err(err) => {
                error!(endpoint = %self.name, error = %err, "error during lua execution");
                script_fault()
            }
        }
    }

    fn invoke(&self, handler: &Function, request: &Request) -> mlua::Result<Response> {
        let returned = handler.call::<Value>(LuaRequest(request.clone()))?;

        let table = match returned {
            Value::Table(table) => table,
            other => {
                return Err(mlua::Error::runtime(format!(
                    "handler returned {}, expected table",
                    other.type_name()
                )))
            }
        };

        let mut response = Response::default();

        if let Value::Integer(code) = table.get::<Value>("status")? {
            match u16::try_from(code) {
                Ok(code) => response.set_status_code(code),
                Err(_) => debug!(endpoint = %self.name, code, "status out of range, ignored"),
            }
        }

        if let Value::String(reason) = table.get::<Value>("reason")? {
            response.set_reason(reason.to_string_lossy().to_string());
        }

        if let Value::Table(headers) = table.get::<Value>("headers")? {
            for pair in headers.pairs::<Value, Value>() {
                let (key, value) = pair?;
                match (coerce_to_string(&key), coerce_to_string(&value)) {
                    (Some(key), Some(value)) => response.set_header(key, value),
                    _ => debug!(endpoint = %self.name, "skipping non-scalar header entry"),
                }
            }
        }

        let content = table.get::<Value>("content")?;
        if !content.is_nil() {
            response.set_body(lua_to_json(&content).to_string());
        }

        // No mime type set by the script, fall back to the endpoint's.
        if response.header("Content-Type").is_none() {
            response.set_header("Content-Type", &self.mime_type);
        }

        Ok(response)
    }
}

/// A static file responder. The path is fixed at construction time.
pub struct ResourceEndpoint {
    name: String,
    mime_type: String,
    path: PathBuf,
}

impl ResourceEndpoint {
    fn from_definition(definition: &Table) -> Result<ResourceEndpoint, DefinitionError> {
        let name = required_name(definition)?;
        let mime_type = optional_mime_type(definition, &name, RESOURCE_MIME_TYPE)?;

        let path = match definition.get::<Value>("path")? {
            Value::String(s) => PathBuf::from(s.to_string_lossy().to_string()),
            _ => return Err(DefinitionError::InvalidPath(name)),
        };

        Ok(ResourceEndpoint {
            name,
            mime_type,
            path,
        })
    }

    fn handle(&self, request: &Request) -> Outcome {
        if !request.method().eq_ignore_ascii_case("GET") {
            return Outcome::Respond(Response::with_body(
                StatusCode::METHOD_NOT_ALLOWED,
                "Resources must be gotten with the GET method",
            ));
        }

        match fs::read(&self.path) {
            Ok(bytes) => {
                let mut response =
                    Response::with_body(StatusCode::OK, String::from_utf8_lossy(&bytes));
                response.set_header("Content-Type", &self.mime_type);
                Outcome::Respond(response)
            }
            Err(err) => {
                error!(endpoint = %self.name, path = %self.path.display(), error = %err,
                    "could not read resource file");
                Outcome::Respond(Response::with_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not read resource",
                ))
            }
        }
    }
}

/// A pure redirect to another registered endpoint. Never produces a
/// response itself.
pub struct AliasEndpoint {
    name: String,
    target: String,
    mutator: Option<Function>,
}

impl AliasEndpoint {
    fn from_definition(definition: &Table) -> Result<AliasEndpoint, DefinitionError> {
        let name = required_name(definition)?;

        let target = match definition.get::<Value>("to")? {
            Value::String(s) => s.to_string_lossy().to_string(),
            _ => return Err(DefinitionError::InvalidTarget(name)),
        };

        let mutator = match definition.get::<Value>("request_mutator")? {
            Value::Nil => None,
            Value::Function(function) => Some(function),
            _ => return Err(DefinitionError::InvalidMutator(name)),
        };

        Ok(AliasEndpoint {
            name,
            target,
            mutator,
        })
    }

    fn handle(&self, request: &Request) -> Outcome {
        let redirect = Request::new(
            request.method().to_string(),
            format!("{}?{}", self.target, request.query_string()),
            request.version().to_string(),
            request.headers().clone(),
            request.body().to_string(),
        );

        let redirect = match &self.mutator {
            None => redirect,
            Some(mutator) => match mutate(mutator, redirect) {
                Ok(mutated) => mutated,
                Err(err) => {
                    error!(endpoint = %self.name, error = %err, "request mutator failed");
                    return script_fault();
                }
            },
        };

        Outcome::Redirect(redirect)
    }
}

fn mutate(mutator: &Function, request: Request) -> mlua::Result<Request> {
    match mutator.call::<Value>(LuaRequest(request))? {
        Value::UserData(userdata) => Ok(userdata.borrow::<LuaRequest>()?.0.clone()),
        other => Err(mlua::Error::runtime(format!(
            "request mutator returned {}, expected the request",
            other.type_name()
        ))),
    }
}
