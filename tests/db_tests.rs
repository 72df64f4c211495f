use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use luahttpd::db::{readiness, Database, DbError, ReadinessError, Row, SqlValue, Statement};
use luahttpd::dispatch::dispatch;
use luahttpd::http::Request;
use luahttpd::loader::ScriptLoader;
use luahttpd::registry::EndpointRegistry;
use rustc_hash::FxHashMap;

/// Records prepared SQL and bound parameters, and plays back canned rows.
struct FakeDatabase {
    prepared: Rc<RefCell<Vec<String>>>,
    bound: Rc<RefCell<Vec<Vec<SqlValue>>>>,
    rows: Vec<Row>,
    fail_prepare: bool,
}

struct FakeStatement {
    bound: Rc<RefCell<Vec<Vec<SqlValue>>>>,
    rows: Vec<Row>,
}

impl Database for FakeDatabase {
    fn prepare(&self, sql: &str) -> Result<Box<dyn Statement>, DbError> {
        if self.fail_prepare {
            return Err(DbError("no connection".to_string()));
        }
        self.prepared.borrow_mut().push(sql.to_string());
        Ok(Box::new(FakeStatement {
            bound: Rc::clone(&self.bound),
            rows: self.rows.clone(),
        }))
    }
}

impl Statement for FakeStatement {
    fn select(&mut self, params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
        self.bound.borrow_mut().push(params.to_vec());
        Ok(self.rows.clone())
    }

    fn update(&mut self, params: &[SqlValue]) -> Result<u64, DbError> {
        self.bound.borrow_mut().push(params.to_vec());
        Ok(3)
    }
}

fn get(target: &str) -> Request {
    Request::new(
        "GET".to_string(),
        target.to_string(),
        "HTTP/1.1".to_string(),
        FxHashMap::default(),
        String::new(),
    )
}

fn serve_script(
    database: FakeDatabase,
    script: &str,
) -> (EndpointRegistry, mlua::Lua) {
    let registry = EndpointRegistry::new();
    let loader = ScriptLoader::new(Some(Rc::new(database))).unwrap();
    loader.lua().load(script).exec().unwrap();
    let lua = loader.finish(&registry);
    (registry, lua)
}

#[test]
fn parameters_bind_by_position() {
    let prepared = Rc::new(RefCell::new(Vec::new()));
    let bound = Rc::new(RefCell::new(Vec::new()));
    let database = FakeDatabase {
        prepared: Rc::clone(&prepared),
        bound: Rc::clone(&bound),
        rows: Vec::new(),
        fail_prepare: false,
    };

    let (registry, _lua) = serve_script(
        database,
        r#"
        endpoints['q'] = {
            name = '/q',
            type = 'script',
            handler = function()
                local stmt = database:prepare('select * from users where id = ?')
                stmt:select({ 7, 'bob', true, 2.5 })
                return { status = 200 }
            end,
        }
        "#,
    );

    let response = dispatch(&registry, get("/q"));
    assert_eq!(response.status().code(), 200);

    assert_eq!(
        prepared.borrow().as_slice(),
        ["select * from users where id = ?"]
    );
    assert_eq!(
        bound.borrow().as_slice(),
        [vec![
            SqlValue::Int(7),
            SqlValue::Text("bob".to_string()),
            SqlValue::Bool(true),
            SqlValue::Float(2.5),
        ]]
    );
}

#[test]
fn unsupported_parameter_types_keep_their_position() {
    let bound = Rc::new(RefCell::new(Vec::new()));
    let database = FakeDatabase {
        prepared: Rc::new(RefCell::new(Vec::new())),
        bound: Rc::clone(&bound),
        rows: Vec::new(),
        fail_prepare: false,
    };

    // The thread in the middle is outside the binding contract; it must
    // not shift 'x' down a slot.
    let (registry, _lua) = serve_script(
        database,
        r#"
        endpoints['q'] = {
            name = '/q',
            type = 'script',
            handler = function()
                local stmt = database:prepare('select ?, ?, ?')
                stmt:select({ 1, coroutine.create(function() end), 'x' })
                return { status = 200 }
            end,
        }
        "#,
    );

    dispatch(&registry, get("/q"));
    assert_eq!(
        bound.borrow().as_slice(),
        [vec![
            SqlValue::Int(1),
            SqlValue::Null,
            SqlValue::Text("x".to_string()),
        ]]
    );
}

#[test]
fn userdata_parameters_pass_through_opaquely() {
    let bound = Rc::new(RefCell::new(Vec::new()));
    let database = FakeDatabase {
        prepared: Rc::new(RefCell::new(Vec::new())),
        bound: Rc::clone(&bound),
        rows: Vec::new(),
        fail_prepare: false,
    };

    let (registry, _lua) = serve_script(
        database,
        r#"
        endpoints['q'] = {
            name = '/q',
            type = 'script',
            handler = function(request)
                local stmt = database:prepare('insert into log values (?, ?)')
                stmt:update({ 'tag', request })
                return { status = 200 }
            end,
        }
        "#,
    );

    let response = dispatch(&registry, get("/q"));
    assert_eq!(response.status().code(), 200);

    let bound = bound.borrow();
    assert_eq!(bound.len(), 1);
    assert_eq!(bound[0][0], SqlValue::Text("tag".to_string()));
    assert!(matches!(bound[0][1], SqlValue::Opaque(_)));
}

#[test]
fn rows_come_back_as_indexed_tables() {
    let database = FakeDatabase {
        prepared: Rc::new(RefCell::new(Vec::new())),
        bound: Rc::new(RefCell::new(Vec::new())),
        rows: vec![
            vec![
                ("id".to_string(), SqlValue::Int(1)),
                ("name".to_string(), SqlValue::Text("ada".to_string())),
            ],
            vec![
                ("id".to_string(), SqlValue::Int(2)),
                ("name".to_string(), SqlValue::Null),
            ],
        ],
        fail_prepare: false,
    };

    let (registry, _lua) = serve_script(
        database,
        r#"
        endpoints['rows'] = {
            name = '/rows',
            type = 'script',
            handler = function()
                local rows = database:prepare('select id, name from t'):select()
                return {
                    status = 200,
                    content = { count = #rows, first = rows[1].name, second_id = rows[2].id },
                }
            end,
        }
        "#,
    );

    let response = dispatch(&registry, get("/rows"));
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(response.body().unwrap()).unwrap(),
        serde_json::json!({ "count": 2, "first": "ada", "second_id": 2 })
    );
}

#[test]
fn update_returns_affected_count_and_prepare_failure_is_nil() {
    let database = FakeDatabase {
        prepared: Rc::new(RefCell::new(Vec::new())),
        bound: Rc::new(RefCell::new(Vec::new())),
        rows: Vec::new(),
        fail_prepare: false,
    };

    let (registry, _lua) = serve_script(
        database,
        r#"
        endpoints['u'] = {
            name = '/u',
            type = 'script',
            handler = function()
                local count = database:prepare('delete from t'):update({ 1 })
                return { status = 200, content = { affected = count } }
            end,
        }
        "#,
    );
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(
            dispatch(&registry, get("/u")).body().unwrap()
        )
        .unwrap(),
        serde_json::json!({ "affected": 3 })
    );

    let failing = FakeDatabase {
        prepared: Rc::new(RefCell::new(Vec::new())),
        bound: Rc::new(RefCell::new(Vec::new())),
        rows: Vec::new(),
        fail_prepare: true,
    };
    let (registry, _lua) = serve_script(
        failing,
        r#"
        endpoints['f'] = {
            name = '/f',
            type = 'script',
            handler = function()
                local stmt = database:prepare('select 1')
                return { status = 200, content = { got_statement = stmt ~= nil } }
            end,
        }
        "#,
    );
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(
            dispatch(&registry, get("/f")).body().unwrap()
        )
        .unwrap(),
        serde_json::json!({ "got_statement": false })
    );
}

#[tokio::test]
async fn readiness_resolves_when_signaled() {
    let (signal, waiter) = readiness();
    signal.ready();
    assert!(waiter.wait(Duration::from_secs(1)).await.is_ok());
}

#[tokio::test]
async fn readiness_reports_abandonment() {
    let (signal, waiter) = readiness();
    drop(signal);
    assert!(matches!(
        waiter.wait(Duration::from_secs(1)).await,
        Err(ReadinessError::Abandoned)
    ));
}

#[tokio::test]
async fn readiness_times_out() {
    let (_signal, waiter) = readiness();
    assert!(matches!(
        waiter.wait(Duration::from_millis(20)).await,
        Err(ReadinessError::TimedOut)
    ));
}
