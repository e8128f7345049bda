use std::rc::Rc;

use chrono::Utc;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::lock::Mutex;
use futures::StreamExt;
use sauron::{
    html::{attributes::*, *},
    prelude::*,
};
use shared::{
    CreateTaskRequest, ListBody, MutationKind, NewTask, Tab, Task, TaskError, TaskListState,
    TaskPatch, Ticket, DELETE_CONFIRMATION,
};
use uuid::Uuid;
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{console, window, EventSource, MessageEvent, Request, RequestInit, Response};

#[derive(Debug, Clone)]
pub enum FeedEvent {
    Snapshot(Vec<Task>),
    Failed(String),
    Closed,
}

#[derive(Debug, Clone)]
pub enum Msg {
    // Navigation
    NavigateTo(Tab),
    RouteChanged(String),

    // Live list
    Feed(Ticket, FeedEvent),

    // Tasks
    SetNewTaskText(String),
    AddTask,
    ToggleTask(Uuid),
    DeleteTask(Uuid),
    MutationSent,
    Error(TaskError),
    NoOp,
}

/// One `EventSource` per open tab. Snapshots are queued and pulled one at a
/// time by the update loop.
struct LiveFeed {
    source: EventSource,
    sender: UnboundedSender<FeedEvent>,
    events: Mutex<UnboundedReceiver<FeedEvent>>,
    _on_snapshot: Closure<dyn FnMut(MessageEvent)>,
    _on_failure: Closure<dyn FnMut(MessageEvent)>,
    _on_error: Closure<dyn FnMut(web_sys::Event)>,
}

impl LiveFeed {
    fn open(tab: Tab) -> Result<Self, String> {
        let mut url = format!("/api/tasks/live?tab={}&utc_offset={}", tab, local_utc_offset());
        if let Some(zone) = local_time_zone() {
            url.push_str("&tz=");
            url.push_str(&String::from(js_sys::encode_uri_component(&zone)));
        }
        let source = EventSource::new(&url).map_err(|e| format!("{e:?}"))?;
        let (sender, events) = unbounded();

        let tx = sender.clone();
        let on_snapshot = Closure::wrap(Box::new(move |event: MessageEvent| {
            let data = event.data().as_string().unwrap_or_default();
            let parsed = serde_json::from_str::<Vec<Task>>(&data)
                .map(FeedEvent::Snapshot)
                .unwrap_or_else(|e| FeedEvent::Failed(format!("malformed snapshot: {e}")));
            let _ = tx.unbounded_send(parsed);
        }) as Box<dyn FnMut(MessageEvent)>);

        let tx = sender.clone();
        let on_failure = Closure::wrap(Box::new(move |event: MessageEvent| {
            let message = event.data().as_string().unwrap_or_default();
            let _ = tx.unbounded_send(FeedEvent::Failed(message));
        }) as Box<dyn FnMut(MessageEvent)>);

        // The browser would silently reconnect; a dropped feed is reported
        // instead and the user reloads the tab.
        let tx = sender.clone();
        let on_error = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            let _ = tx.unbounded_send(FeedEvent::Failed("connection lost".into()));
        }) as Box<dyn FnMut(web_sys::Event)>);

        source
            .add_event_listener_with_callback("snapshot", on_snapshot.as_ref().unchecked_ref())
            .map_err(|e| format!("{e:?}"))?;
        source
            .add_event_listener_with_callback("failure", on_failure.as_ref().unchecked_ref())
            .map_err(|e| format!("{e:?}"))?;
        source.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        console::log_1(&format!("[feed] opened {url}").into());
        Ok(Self {
            source,
            sender,
            events: Mutex::new(events),
            _on_snapshot: on_snapshot,
            _on_failure: on_failure,
            _on_error: on_error,
        })
    }

    async fn next(&self) -> FeedEvent {
        self.events.lock().await.next().await.unwrap_or(FeedEvent::Closed)
    }

    /// Stops the stream and wakes any pending `next` with `Closed`.
    fn close(&self) {
        self.source.set_onerror(None);
        self.source.close();
        self.sender.close_channel();
    }
}

/// Browser back/forward, forwarded into the update loop.
struct RouteEvents {
    events: Mutex<UnboundedReceiver<String>>,
    _on_popstate: Closure<dyn FnMut(web_sys::PopStateEvent)>,
}

impl RouteEvents {
    fn listen() -> Option<Self> {
        let (tx, events) = unbounded();
        let on_popstate = Closure::wrap(Box::new(move |_event: web_sys::PopStateEvent| {
            if let Some(pathname) = window().and_then(|w| w.location().pathname().ok()) {
                let _ = tx.unbounded_send(pathname);
            }
        }) as Box<dyn FnMut(_)>);

        window()?
            .add_event_listener_with_callback("popstate", on_popstate.as_ref().unchecked_ref())
            .ok()?;

        Some(Self {
            events: Mutex::new(events),
            _on_popstate: on_popstate,
        })
    }

    async fn next(&self) -> Option<String> {
        self.events.lock().await.next().await
    }
}

pub struct Model {
    list: TaskListState,
    new_task_text: String,
    feed: Option<Rc<LiveFeed>>,
    routes: Option<Rc<RouteEvents>>,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            list: TaskListState::default(),
            new_task_text: String::new(),
            feed: None,
            routes: None,
        }
    }
}

impl Application for Model {
    type MSG = Msg;

    fn init(&mut self) -> Cmd<Msg> {
        let tab = window()
            .and_then(|w| w.location().pathname().ok())
            .map(|path| Tab::from_path(&path))
            .unwrap_or_default();

        self.routes = RouteEvents::listen().map(Rc::new);
        Cmd::batch([self.open_tab(tab), self.next_route()])
    }

    fn update(&mut self, msg: Msg) -> Cmd<Msg> {
        match msg {
            Msg::NavigateTo(tab) => {
                if let Some(history) = window().and_then(|w| w.history().ok()) {
                    let _ = history.push_state_with_url(&JsValue::NULL, "", Some(tab.path()));
                }
                if tab == self.list.tab() {
                    return Cmd::none();
                }
                self.open_tab(tab)
            }
            Msg::RouteChanged(path) => {
                let tab = Tab::from_path(&path);
                let open = if tab != self.list.tab() {
                    self.open_tab(tab)
                } else {
                    Cmd::none()
                };
                Cmd::batch([open, self.next_route()])
            }
            Msg::Feed(ticket, FeedEvent::Snapshot(tasks)) => {
                if !self.list.apply_snapshot(ticket, tasks) {
                    return Cmd::none();
                }
                match &self.feed {
                    Some(feed) => next_feed_event(ticket, Rc::clone(feed)),
                    None => Cmd::none(),
                }
            }
            Msg::Feed(ticket, FeedEvent::Failed(message)) => {
                let err = TaskError::Subscription(message);
                if self.list.apply_error(ticket, err.clone()) {
                    if let Some(feed) = self.feed.take() {
                        feed.close();
                    }
                    report(&err);
                }
                Cmd::none()
            }
            Msg::Feed(_, FeedEvent::Closed) => Cmd::none(),
            Msg::SetNewTaskText(text) => {
                self.new_task_text = text;
                Cmd::none()
            }
            Msg::AddTask => {
                let draft = match NewTask::from_input(&self.new_task_text, Utc::now()) {
                    Ok(draft) => draft,
                    Err(err) => {
                        report(&err);
                        return Cmd::none();
                    }
                };
                self.new_task_text.clear();

                Cmd::new(async move {
                    match create_task(draft.text).await {
                        Ok(()) => Msg::MutationSent,
                        Err(e) => Msg::Error(TaskError::mutation(MutationKind::Add, e)),
                    }
                })
            }
            Msg::ToggleTask(id) => {
                let Some(patch) = self.list.find(id).map(TaskPatch::toggle) else {
                    return Cmd::none();
                };
                Cmd::new(async move {
                    match update_task(id, &patch).await {
                        Ok(()) => Msg::MutationSent,
                        Err(e) => Msg::Error(TaskError::mutation(MutationKind::Update, e)),
                    }
                })
            }
            Msg::DeleteTask(id) => {
                let confirmed = window()
                    .and_then(|w| w.confirm_with_message(DELETE_CONFIRMATION).ok())
                    .unwrap_or(false);
                if !confirmed {
                    return Cmd::none();
                }
                Cmd::new(async move {
                    match delete_task(id).await {
                        Ok(()) => Msg::MutationSent,
                        Err(e) => Msg::Error(TaskError::mutation(MutationKind::Delete, e)),
                    }
                })
            }
            // The change shows up through the next snapshot.
            Msg::MutationSent | Msg::NoOp => Cmd::none(),
            Msg::Error(err) => {
                report(&err);
                Cmd::none()
            }
        }
    }

    fn view(&self) -> Node<Msg> {
        div(
            [class("app-container")],
            [
                self.view_sidebar(),
                div([class("main-content")], [self.view_task_list()]),
            ],
        )
    }
}

impl Model {
    /// Closes the current feed before opening the next one.
    fn open_tab(&mut self, tab: Tab) -> Cmd<Msg> {
        if let Some(feed) = self.feed.take() {
            feed.close();
        }
        let ticket = self.list.open(tab);

        match LiveFeed::open(tab) {
            Ok(feed) => {
                let feed = Rc::new(feed);
                self.feed = Some(Rc::clone(&feed));
                next_feed_event(ticket, feed)
            }
            Err(e) => {
                let err = TaskError::Subscription(e);
                self.list.apply_error(ticket, err.clone());
                report(&err);
                Cmd::none()
            }
        }
    }

    fn next_route(&self) -> Cmd<Msg> {
        match &self.routes {
            Some(routes) => {
                let routes = Rc::clone(routes);
                Cmd::new(async move {
                    match routes.next().await {
                        Some(path) => Msg::RouteChanged(path),
                        None => Msg::NoOp,
                    }
                })
            }
            None => Cmd::none(),
        }
    }

    fn view_sidebar(&self) -> Node<Msg> {
        aside(
            [class("sidebar")],
            [
                h1([class("app-title")], [text("To-Do List")]),
                nav(
                    [],
                    [ul(
                        [],
                        Tab::ALL.iter().map(|tab| self.nav_link(*tab)).collect::<Vec<_>>(),
                    )],
                ),
            ],
        )
    }

    fn nav_link(&self, tab: Tab) -> Node<Msg> {
        let is_active = self.list.tab() == tab;
        li(
            [],
            [a(
                [
                    href(tab.path()),
                    on_click(move |event| {
                        event.prevent_default();
                        Msg::NavigateTo(tab)
                    }),
                    class(if is_active { "nav-link active" } else { "nav-link" }),
                ],
                [text(tab.label())],
            )],
        )
    }

    fn view_task_list(&self) -> Node<Msg> {
        let body = match self.list.body() {
            ListBody::Loading => {
                return div(
                    [class("loading-container")],
                    [
                        div([class("spinner")], []),
                        p([], [text("Loading tasks...")]),
                    ],
                )
            }
            ListBody::Empty => p([class("empty-list-message")], [text("No tasks yet!")]),
            ListBody::Tasks(tasks) => div(
                [class("task-items-container")],
                tasks.iter().map(|task| self.view_task(task)).collect::<Vec<_>>(),
            ),
        };

        div(
            [class("task-list-page")],
            [
                h2([], [text(self.list.tab().heading())]),
                self.view_task_input(),
                body,
            ],
        )
    }

    fn view_task_input(&self) -> Node<Msg> {
        div(
            [class("task-input-container")],
            [
                input(
                    [
                        r#type("text"),
                        class("task-input"),
                        placeholder("Add a new task..."),
                        value(&self.new_task_text),
                        on_input(|event| Msg::SetNewTaskText(event.value())),
                        on_keypress(|event| {
                            if event.key() == "Enter" {
                                Msg::AddTask
                            } else {
                                Msg::NoOp
                            }
                        }),
                    ],
                    [],
                ),
                button([class("add-button"), on_click(|_| Msg::AddTask)], [text("Add")]),
            ],
        )
    }

    fn view_task(&self, task: &Task) -> Node<Msg> {
        let id = task.id;
        div(
            [key(task.id.to_string()), class("task-item")],
            [
                div(
                    [class("task-content")],
                    [
                        input(
                            [
                                r#type("checkbox"),
                                class("task-checkbox"),
                                checked(task.completed),
                                // The box only changes when a snapshot says so.
                                on_click(move |event| {
                                    event.prevent_default();
                                    Msg::ToggleTask(id)
                                }),
                            ],
                            [],
                        ),
                        span(
                            [class(if task.completed {
                                "task-text completed"
                            } else {
                                "task-text"
                            })],
                            [text(&task.text)],
                        ),
                    ],
                ),
                button(
                    [class("delete-button"), on_click(move |_| Msg::DeleteTask(id))],
                    [text("Delete")],
                ),
            ],
        )
    }
}

fn next_feed_event(ticket: Ticket, feed: Rc<LiveFeed>) -> Cmd<Msg> {
    Cmd::new(async move { Msg::Feed(ticket, feed.next().await) })
}

/// Minutes east of UTC right now. Only a fallback for browsers that do not
/// report an IANA zone, since it ignores DST changes within a period.
fn local_utc_offset() -> i32 {
    -(js_sys::Date::new_0().get_timezone_offset() as i32)
}

/// The browser's IANA zone, e.g. `Europe/Berlin`.
fn local_time_zone() -> Option<String> {
    let format = js_sys::Intl::DateTimeFormat::new(&js_sys::Array::new(), &js_sys::Object::new());
    let options = format.resolved_options();
    js_sys::Reflect::get(&options, &JsValue::from_str("timeZone"))
        .ok()?
        .as_string()
        .filter(|zone| !zone.is_empty())
}

fn report(err: &TaskError) {
    console::error_1(&format!("{err}").into());
    if let Some(window) = window() {
        let _ = window.alert_with_message(err.notice());
    }
}

async fn send(method: &str, url: &str, body: Option<String>) -> Result<Response, String> {
    let opts = RequestInit::new();
    opts.set_method(method);
    if let Some(body) = &body {
        opts.set_body(&JsValue::from_str(body));
    }

    let request =
        Request::new_with_str_and_init(url, &opts).map_err(|_| "Failed to create request")?;
    if body.is_some() {
        request
            .headers()
            .set("Content-Type", "application/json")
            .map_err(|_| "Failed to set header")?;
    }

    let promise = window()
        .ok_or("No window")?
        .fetch_with_request(&request);

    let response: Response = JsFuture::from(promise)
        .await
        .map_err(|_| "Failed to send request")?
        .into();

    if response.ok() {
        Ok(response)
    } else {
        Err(format!("server responded with {}", response.status()))
    }
}

async fn create_task(text: String) -> Result<(), String> {
    let body = serde_json::to_string(&CreateTaskRequest { text })
        .map_err(|_| "Failed to serialize request")?;
    send("POST", "/api/tasks", Some(body)).await.map(drop)
}

async fn update_task(id: Uuid, patch: &TaskPatch) -> Result<(), String> {
    let body = serde_json::to_string(patch).map_err(|_| "Failed to serialize request")?;
    send("PATCH", &format!("/api/tasks/{id}"), Some(body))
        .await
        .map(drop)
}

async fn delete_task(id: Uuid) -> Result<(), String> {
    send("DELETE", &format!("/api/tasks/{id}"), None)
        .await
        .map(drop)
}

#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    Program::mount_to_body(Model::default());
}
