//! End-to-end render scenarios: full renders, incremental renders,
//! component lifecycle, and the client-mirror round trip.

use std::sync::{Arc, Mutex};

use serde_json::json;

use calque::{
    Assigns, Changes, Component, ComponentError, Comprehension, Registry, Rendered, Session,
    Socket, Template, render,
};

type EventLog = Arc<Mutex<Vec<String>>>;

/// A greeting component: `mount` seeds `greeting`, `update` merges caller
/// assigns, `render` interleaves both. Every callback is logged.
struct Greeter {
    tag: &'static str,
    events: EventLog,
}

impl Greeter {
    fn module(tag: &'static str, events: &EventLog) -> Arc<dyn Component> {
        Arc::new(Self {
            tag,
            events: Arc::clone(events),
        })
    }
}

fn log(events: &EventLog, tag: &str, callback: &str) {
    events.lock().unwrap().push(format!("{tag}:{callback}"));
}

fn socket_str(socket: &Socket, key: &str) -> String {
    socket
        .get(key)
        .and_then(|value| value.as_str())
        .unwrap_or("")
        .to_string()
}

impl Component for Greeter {
    fn name(&self) -> &'static str {
        self.tag
    }

    fn mount(&self, socket: &mut Socket) -> Result<(), ComponentError> {
        log(&self.events, self.tag, "mount");
        socket.assign("greeting", json!("world"));
        Ok(())
    }

    fn update(&self, assigns: &Assigns, socket: &mut Socket) -> Result<(), ComponentError> {
        log(&self.events, self.tag, "update");
        socket.merge(assigns);
        Ok(())
    }

    fn render(&self, socket: &Socket) -> Result<Template, ComponentError> {
        log(&self.events, self.tag, "render");
        if socket.get("boom").is_some() {
            return Err(ComponentError::new("boom requested"));
        }
        Ok(Template::new(
            ["FROM ", " ", "\n"],
            [
                Rendered::Text(socket_str(socket, "from")),
                Rendered::Text(socket_str(socket, "greeting")),
            ],
        ))
    }
}

/// A component that renders a nested reference to another component
struct Wrapper {
    inner: Arc<dyn Component>,
    events: EventLog,
}

impl Component for Wrapper {
    fn name(&self) -> &'static str {
        "wrapper"
    }

    fn mount(&self, _socket: &mut Socket) -> Result<(), ComponentError> {
        log(&self.events, "wrapper", "mount");
        Ok(())
    }

    fn update(&self, assigns: &Assigns, socket: &mut Socket) -> Result<(), ComponentError> {
        log(&self.events, "wrapper", "update");
        socket.merge(assigns);
        Ok(())
    }

    fn render(&self, socket: &Socket) -> Result<Template, ComponentError> {
        log(&self.events, "wrapper", "render");
        Ok(Template::new(
            ["<section>", "</section>"],
            [Rendered::component(
                "wrapped-child",
                Arc::clone(&self.inner),
                Assigns::from([("from".to_string(), json!(socket_str(socket, "from")))]),
            )],
        ))
    }
}

/// A component whose output contains a comprehension with fixed rows
struct Lister;

impl Component for Lister {
    fn name(&self) -> &'static str {
        "lister"
    }

    fn mount(&self, _socket: &mut Socket) -> Result<(), ComponentError> {
        Ok(())
    }

    fn update(&self, assigns: &Assigns, socket: &mut Socket) -> Result<(), ComponentError> {
        socket.merge(assigns);
        Ok(())
    }

    fn render(&self, socket: &Socket) -> Result<Template, ComponentError> {
        Ok(Template::new(
            ["<h3>", "</h3><ul>", "</ul>"],
            [
                Rendered::Text(socket_str(socket, "title")),
                Rendered::Comprehension(Comprehension::new(
                    ["<li>", "</li>"],
                    [
                        vec![Rendered::Text("a".into())],
                        vec![Rendered::Text("b".into())],
                    ],
                )),
            ],
        ))
    }
}

fn from_assigns(value: &str) -> Assigns {
    Assigns::from([("from".to_string(), json!(value))])
}

/// Root page with two dynamic slots and a stable scaffolding
fn page(slot0: Rendered, slot1: Rendered) -> Template {
    Template::new(["<main>", " ", "</main>"], [slot0, slot1])
}

fn as_json(changes: &Changes) -> serde_json::Value {
    serde_json::to_value(changes).unwrap()
}

#[test]
fn test_component_add_renders_only_the_new_one() {
    let events: EventLog = EventLog::default();
    let module = Greeter::module("greeter", &events);

    let first = render(
        &Session::new(),
        &page(
            Rendered::component("hello", Arc::clone(&module), from_assigns("a")),
            Rendered::Nothing,
        ),
        &Registry::new(),
    )
    .unwrap();

    assert_eq!(
        as_json(&first.changes),
        json!({
            "0": 0,
            "static": ["<main>", " ", "</main>"],
            "components": {
                "0": {"0": "a", "1": "world", "static": ["FROM ", " ", "\n"]},
            },
        })
    );
    assert_eq!(
        *events.lock().unwrap(),
        vec!["greeter:mount", "greeter:update", "greeter:render"]
    );
    events.lock().unwrap().clear();

    // same reference plus a new one: the existing component is updated but
    // not re-rendered, the addition mounts and renders in full
    let second = render(
        &first.session,
        &page(
            Rendered::component("hello", Arc::clone(&module), from_assigns("a")),
            Rendered::component("another", Arc::clone(&module), from_assigns("b")),
        ),
        &first.components,
    )
    .unwrap();

    assert_eq!(
        as_json(&second.changes),
        json!({
            "0": 0,
            "1": 1,
            "components": {
                "1": {"0": "b", "1": "world", "static": ["FROM ", " ", "\n"]},
            },
        })
    );
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "greeter:update",
            "greeter:mount",
            "greeter:update",
            "greeter:render",
        ]
    );
}

#[test]
fn test_changed_assigns_rerender_stays_incremental() {
    let events: EventLog = EventLog::default();
    let module = Greeter::module("greeter", &events);
    let hello = |from: &str| {
        page(
            Rendered::component("hello", Arc::clone(&module), from_assigns(from)),
            Rendered::Nothing,
        )
    };

    let first = render(&Session::new(), &hello("a"), &Registry::new()).unwrap();
    let second = render(&first.session, &hello("b"), &first.components).unwrap();

    // statics are elided on the re-render; the dynamics always ship
    assert_eq!(
        as_json(&second.changes),
        json!({"0": 0, "components": {"0": {"0": "b", "1": "world"}}})
    );
}

#[test]
fn test_component_replace_reuses_cid_and_remounts() {
    let events: EventLog = EventLog::default();
    let original = Greeter::module("greeter", &events);
    let replacement = Greeter::module("farewell", &events);

    let first = render(
        &Session::new(),
        &page(
            Rendered::component("hello", Arc::clone(&original), from_assigns("a")),
            Rendered::Nothing,
        ),
        &Registry::new(),
    )
    .unwrap();
    events.lock().unwrap().clear();

    let second = render(
        &first.session,
        &page(
            Rendered::component("hello", Arc::clone(&replacement), from_assigns("a")),
            Rendered::Nothing,
        ),
        &first.components,
    )
    .unwrap();

    // same cid, but the full change map (statics included) goes out again
    assert_eq!(
        as_json(&second.changes),
        json!({
            "0": 0,
            "components": {
                "0": {"0": "a", "1": "world", "static": ["FROM ", " ", "\n"]},
            },
        })
    );
    assert_eq!(
        *events.lock().unwrap(),
        vec!["farewell:mount", "farewell:update", "farewell:render"]
    );
    assert_eq!(second.components.cid_of("hello"), Some(0));
}

#[test]
fn test_removed_component_is_collected_cids_stay_monotonic() {
    let events: EventLog = EventLog::default();
    let module = Greeter::module("greeter", &events);

    let first = render(
        &Session::new(),
        &page(
            Rendered::component("one", Arc::clone(&module), from_assigns("a")),
            Rendered::component("two", Arc::clone(&module), from_assigns("b")),
        ),
        &Registry::new(),
    )
    .unwrap();
    assert_eq!(first.components.len(), 2);

    let second = render(
        &first.session,
        &page(
            Rendered::Nothing,
            Rendered::component("two", Arc::clone(&module), from_assigns("b")),
        ),
        &first.components,
    )
    .unwrap();
    assert_eq!(second.components.len(), 1);
    assert_eq!(second.components.cid_of("one"), None);

    // "one" comes back under a fresh cid; 0 is never reissued
    let third = render(
        &second.session,
        &page(
            Rendered::component("one", Arc::clone(&module), from_assigns("a")),
            Rendered::component("two", Arc::clone(&module), from_assigns("b")),
        ),
        &second.components,
    )
    .unwrap();
    assert_eq!(third.components.cid_of("one"), Some(2));
    assert_eq!(third.components.cid_of("two"), Some(1));
    assert_eq!(third.components.extern_id(2), Some("one"));
    assert_eq!(third.components.extern_id(0), None);
}

#[test]
fn test_nested_component_changes_land_at_the_root() {
    let events: EventLog = EventLog::default();
    let inner = Greeter::module("greeter", &events);
    let outer: Arc<dyn Component> = Arc::new(Wrapper {
        inner,
        events: Arc::clone(&events),
    });

    let result = render(
        &Session::new(),
        &page(
            Rendered::component("outer", Arc::clone(&outer), from_assigns("x")),
            Rendered::Nothing,
        ),
        &Registry::new(),
    )
    .unwrap();

    // the wrapper's slot holds the bare cid of the wrapped child; both
    // full renders sit side by side under the root `components` key
    assert_eq!(
        as_json(&result.changes),
        json!({
            "0": 0,
            "components": {
                "0": {"0": 1, "static": ["<section>", "</section>"]},
                "1": {"0": "x", "1": "world", "static": ["FROM ", " ", "\n"]},
            },
        })
    );
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "wrapper:mount",
            "wrapper:update",
            "wrapper:render",
            "greeter:mount",
            "greeter:update",
            "greeter:render",
        ]
    );
    assert_eq!(
        result.changes.to_html().unwrap(),
        "<main><section>FROM x world\n</section> </main>"
    );
}

#[test]
fn test_clean_parent_keeps_nested_component_alive() {
    let events: EventLog = EventLog::default();
    let inner = Greeter::module("greeter", &events);
    let outer: Arc<dyn Component> = Arc::new(Wrapper {
        inner,
        events: Arc::clone(&events),
    });
    let tree = |from: &str| {
        page(
            Rendered::component("outer", Arc::clone(&outer), from_assigns(from)),
            Rendered::Nothing,
        )
    };

    let first = render(&Session::new(), &tree("x"), &Registry::new()).unwrap();
    assert_eq!(first.components.len(), 2);
    events.lock().unwrap().clear();

    // unchanged assigns: the wrapper is clean and not re-rendered, but the
    // component nested in its retained output must not be collected
    let second = render(&first.session, &tree("x"), &first.components).unwrap();
    assert_eq!(as_json(&second.changes), json!({"0": 0}));
    assert_eq!(second.components.len(), 2);
    assert_eq!(second.components.cid_of("wrapped-child"), Some(1));
    assert_eq!(*events.lock().unwrap(), vec!["wrapper:update"]);
    events.lock().unwrap().clear();

    // a later change reaches the child under its original cid with its
    // mount state intact: no re-mount
    let third = render(&second.session, &tree("y"), &second.components).unwrap();
    assert_eq!(third.components.cid_of("wrapped-child"), Some(1));
    assert_eq!(
        as_json(&third.changes),
        json!({
            "0": 0,
            "components": {
                "0": {"0": 1},
                "1": {"0": "y", "1": "world"},
            },
        })
    );
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "wrapper:update",
            "wrapper:render",
            "greeter:update",
            "greeter:render",
        ]
    );
}

#[test]
fn test_dirty_component_rerender_emits_complete_comprehension() {
    let module: Arc<dyn Component> = Arc::new(Lister);
    let titled = |title: &str| {
        page(
            Rendered::component(
                "list",
                Arc::clone(&module),
                Assigns::from([("title".to_string(), json!(title))]),
            ),
            Rendered::Nothing,
        )
    };

    let first = render(&Session::new(), &titled("first"), &Registry::new()).unwrap();
    assert_eq!(
        as_json(&first.changes),
        json!({
            "0": 0,
            "static": ["<main>", " ", "</main>"],
            "components": {
                "0": {
                    "0": "first",
                    "1": {"static": ["<li>", "</li>"], "dynamics": [["a"], ["b"]]},
                    "static": ["<h3>", "</h3><ul>", "</ul>"],
                },
            },
        })
    );

    // the rows did not change, but a comprehension is never partially
    // memoized: the re-render carries complete dynamics, only the inner
    // statics stay elided
    let second = render(&first.session, &titled("second"), &first.components).unwrap();
    assert_eq!(
        as_json(&second.changes),
        json!({
            "0": 0,
            "components": {
                "0": {"0": "second", "1": {"dynamics": [["a"], ["b"]]}},
            },
        })
    );
}

#[test]
fn test_client_mirror_round_trip() {
    let events: EventLog = EventLog::default();
    let module = Greeter::module("greeter", &events);
    let tree = |items: &[&str], from: &str| {
        page(
            Rendered::Comprehension(Comprehension::new(
                ["<li>", "</li>"],
                items
                    .iter()
                    .map(|item| vec![Rendered::Text(item.to_string())]),
            )),
            Rendered::component("hello", Arc::clone(&module), from_assigns(from)),
        )
    };

    let first = render(&Session::new(), &tree(&["a"], "x"), &Registry::new()).unwrap();
    let mut retained = first.changes.clone();

    let second = render(&first.session, &tree(&["a", "b"], "y"), &first.components).unwrap();
    retained.merge(&second.changes);

    let third = render(&second.session, &tree(&["c"], "y"), &second.components).unwrap();
    retained.merge(&third.changes);

    // folding every frame into the first full render reproduces exactly
    // what a fresh client would receive today
    let fresh = render(&Session::new(), &tree(&["c"], "y"), &Registry::new()).unwrap();
    assert_eq!(retained.to_html().unwrap(), fresh.changes.to_html().unwrap());
    assert_eq!(
        retained.to_html().unwrap(),
        "<main><li>c</li> FROM y world\n</main>"
    );
}

#[test]
fn test_callback_failure_leaves_state_untouched() {
    let events: EventLog = EventLog::default();
    let module = Greeter::module("greeter", &events);
    let hello = |assigns: Assigns| {
        page(
            Rendered::component("hello", Arc::clone(&module), assigns),
            Rendered::Nothing,
        )
    };

    let first = render(&Session::new(), &hello(from_assigns("a")), &Registry::new()).unwrap();

    // a render whose callback blows up commits nothing
    let mut exploding = from_assigns("a");
    exploding.insert("boom".to_string(), json!(true));
    let err = render(&first.session, &hello(exploding), &first.components).unwrap_err();
    assert!(err.to_string().contains("boom requested"));

    // the surviving state neither saw the bad assigns nor lost the entry
    let recovered = render(&first.session, &hello(from_assigns("a")), &first.components).unwrap();
    assert_eq!(as_json(&recovered.changes), json!({"0": 0}));
    assert_eq!(recovered.components.cid_of("hello"), Some(0));
}

#[test]
fn test_statics_elided_at_every_matched_depth() {
    let inner = || {
        Template::new(
            ["<em>", "</em>"],
            [Rendered::Text("deep".into())],
        )
    };
    let tree = || {
        page(
            Rendered::Template(inner()),
            Rendered::Template(Template::new(
                ["<ol>", "</ol>"],
                [Rendered::Template(inner())],
            )),
        )
    };

    let first = render(&Session::new(), &tree(), &Registry::new()).unwrap();
    let serialized = serde_json::to_string(&as_json(&first.changes)).unwrap();
    assert!(serialized.contains("static"));

    let second = render(&first.session, &tree(), &first.components).unwrap();
    let serialized = serde_json::to_string(&as_json(&second.changes)).unwrap();
    // no statics anywhere once the whole structure is known
    assert!(!serialized.contains("static"));
}
