use std::fs;
use std::path::Path;
use std::rc::Rc;

use mlua::{Lua, Table, Value};
use tracing::{error, info};

use crate::db::{Database, DatabaseHandle};
use crate::endpoint::Endpoint;
use crate::registry::EndpointRegistry;

/// Loads Lua script files and collects the endpoint definitions they
/// declare.
///
/// Scripts see three globals: `endpoints`, the table they append their
/// definition tables to; `modules`, an empty table for sharing code between
/// scripts; and `database`, the persistence handle (set only when one is
/// supplied). Each script chunk is invoked with its absolute path as the
/// first argument.
pub struct ScriptLoader {
    lua: Lua,
    endpoints: Table,
}

impl ScriptLoader {
    pub fn new(database: Option<Rc<dyn Database>>) -> mlua::Result<ScriptLoader> {
        let lua = Lua::new();

        let endpoints = lua.create_table()?;
        lua.globals().set("endpoints", &endpoints)?;
        lua.globals().set("modules", lua.create_table()?)?;

        if let Some(database) = database {
            lua.globals().set("database", DatabaseHandle(database))?;
        }

        Ok(ScriptLoader { lua, endpoints })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Recursively load every `.lua` file under `dir`. Per-file failures
    /// are logged; loading continues with the next file.
    pub fn load_directory(&self, dir: &Path) {
        if let Err(err) = self.walk(dir) {
            error!(dir = %dir.display(), error = %err, "could not scan script directory");
        }
    }

    fn walk(&self, dir: &Path) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if entry.metadata()?.is_dir() {
                self.walk(&path)?;
            } else if path.extension().is_some_and(|ext| ext == "lua") {
                self.load_file(&path);
            }
        }

        Ok(())
    }

    fn load_file(&self, path: &Path) {
        info!(file = %path.display(), "loading lua file");

        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                error!(file = %path.display(), error = %err, "could not read lua file");
                return;
            }
        };

        let absolute = path
            .canonicalize()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| path.display().to_string());

        let chunk = self.lua.load(&source).set_name(path.display().to_string());
        if let Err(err) = chunk.call::<()>(absolute) {
            error!(file = %path.display(), error = %err, "could not load file");
        }
    }

    /// Construct endpoints from the accumulated definitions and register
    /// them. One bad definition never aborts the rest.
    ///
    /// Returns the Lua runtime; the caller must keep it alive for as long
    /// as the registered endpoints are in use.
    pub fn finish(self, registry: &EndpointRegistry) -> Lua {
        for pair in self.endpoints.pairs::<Value, Value>() {
            let value = match pair {
                Ok((_, value)) => value,
                Err(err) => {
                    error!(error = %err, "could not read endpoints table");
                    continue;
                }
            };

            let definition = match value {
                Value::Table(definition) => definition,
                _ => {
                    error!("found non-table in endpoints");
                    continue;
                }
            };

            match Endpoint::from_definition(&definition) {
                Ok(endpoint) => registry.register(endpoint),
                Err(err) => error!(error = %err, "invalid endpoint definition, skipping"),
            }
        }

        self.lua
    }
}
