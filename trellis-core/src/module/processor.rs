//! Processor
//!
//! A processor owns everything the core needs to know about one concrete
//! config type: how to build its default config, how to construct and
//! dispose the runtime object, and how patches route to update logic.
//!
//! # Command routing
//!
//! Each operate kind (add/set/delete) may carry a command table: a tree
//! mirroring the config shape whose terminal nodes are handler functions.
//! Dispatch walks the table with successive segments of the patch's path,
//! then its key:
//!
//! 1. A literal match that is a handler executes it and returns.
//! 2. A literal match that is a sub-table descends with the remaining
//!    segments.
//! 3. With no literal match, the level's regex fallbacks are tried in
//!    declared order; the first match wins. Fallbacks cover dynamic keys
//!    like sequence indices.
//! 4. A level with neither a literal match nor a matching fallback (or an
//!    exhausted segment list) falls through to the default operation.
//!
//! # Default operations
//!
//! The default add/set walks the live runtime object along `path` and
//! assigns `value` at `key`; the default delete removes `key`. Config and
//! runtime object are assumed structurally parallel — a missing
//! intermediate segment is a recoverable authoring error: log a warning,
//! skip the patch.
//!
//! `construct` and `dispose` are the only operations permitted to allocate
//! or release the underlying resource. `dispose` receives ownership and
//! must release everything the object held.

use std::rc::Rc;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use super::link::LinkSet;
use super::target::Target;
use crate::error::Result;
use crate::store::{Operate, Patch};

/// Everything a command handler sees for one patch.
pub struct ProcessContext<'a> {
    /// The vid of the entry being synchronized.
    pub vid: &'a str,
    /// Snapshot of the full config entry.
    pub config: &'a Value,
    /// The live runtime object.
    pub target: &'a mut dyn Target,
    /// The patch, with `path` relative to the entry root.
    pub patch: &'a Patch,
    /// Foreign maps for cross-reference resolution.
    pub links: &'a LinkSet,
}

/// What a processor sees when constructing a runtime object.
pub struct ConstructContext<'a> {
    pub vid: &'a str,
    pub config: &'a Value,
    pub links: &'a LinkSet,
}

/// A terminal command: reacts to one patch.
pub type Handler = Box<dyn Fn(&mut ProcessContext<'_>)>;

enum CommandNode {
    Handler(Handler),
    Table(CommandTable),
}

/// One level of the command tree: literal keys plus ordered regex
/// fallbacks for dynamic keys.
#[derive(Default)]
pub struct CommandTable {
    entries: indexmap::IndexMap<String, CommandNode>,
    fallbacks: Vec<(Regex, Handler)>,
}

impl CommandTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a literal key to a handler.
    pub fn on(mut self, key: &str, handler: impl Fn(&mut ProcessContext<'_>) + 'static) -> Self {
        self.entries
            .insert(key.to_string(), CommandNode::Handler(Box::new(handler)));
        self
    }

    /// Route a literal key into a nested table.
    pub fn nest(mut self, key: &str, table: CommandTable) -> Self {
        self.entries
            .insert(key.to_string(), CommandNode::Table(table));
        self
    }

    /// Route keys matching a pattern to a handler. Fallbacks are tried in
    /// declared order after literal keys miss; the first match wins.
    pub fn on_match(
        mut self,
        pattern: Regex,
        handler: impl Fn(&mut ProcessContext<'_>) + 'static,
    ) -> Self {
        self.fallbacks.push((pattern, Box::new(handler)));
        self
    }
}

/// Command tables per operate kind.
#[derive(Default)]
pub struct Commands {
    add: Option<CommandTable>,
    set: Option<CommandTable>,
    delete: Option<CommandTable>,
}

impl Commands {
    /// No custom routing; every patch takes the default operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routing for add patches.
    pub fn add(mut self, table: CommandTable) -> Self {
        self.add = Some(table);
        self
    }

    /// Routing for set patches.
    pub fn set(mut self, table: CommandTable) -> Self {
        self.set = Some(table);
        self
    }

    /// Routing for delete patches.
    pub fn delete(mut self, table: CommandTable) -> Self {
        self.delete = Some(table);
        self
    }

    fn table(&self, operate: Operate) -> Option<&CommandTable> {
        match operate {
            Operate::Add => self.add.as_ref(),
            Operate::Set => self.set.as_ref(),
            Operate::Delete => self.delete.as_ref(),
        }
    }
}

type ConstructFn = Box<dyn Fn(&ConstructContext<'_>) -> Result<Box<dyn Target>>>;
type DisposeFn = Box<dyn Fn(Box<dyn Target>)>;

/// Construct/dispose and patch routing for one concrete config type.
pub struct Processor {
    type_name: String,
    config_factory: Rc<dyn Fn() -> Value>,
    commands: Commands,
    construct: ConstructFn,
    dispose: DisposeFn,
}

impl Processor {
    /// Define a processor for a concrete type.
    pub fn new(
        type_name: &str,
        config_factory: impl Fn() -> Value + 'static,
        construct: impl Fn(&ConstructContext<'_>) -> Result<Box<dyn Target>> + 'static,
        dispose: impl Fn(Box<dyn Target>) + 'static,
    ) -> Self {
        Self {
            type_name: type_name.to_string(),
            config_factory: Rc::new(config_factory),
            commands: Commands::new(),
            construct: Box::new(construct),
            dispose: Box::new(dispose),
        }
    }

    /// Attach command routing.
    pub fn with_commands(mut self, commands: Commands) -> Self {
        self.commands = commands;
        self
    }

    /// The concrete type this processor handles.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Shared handle to the default-config factory.
    pub(crate) fn config_factory(&self) -> Rc<dyn Fn() -> Value> {
        Rc::clone(&self.config_factory)
    }

    /// A fresh default config, with the `type` discriminator filled in and
    /// an empty `vid` for the caller to assign.
    pub fn default_config(&self) -> Value {
        let mut config = (self.config_factory)();
        if let Value::Object(fields) = &mut config {
            fields.insert("type".to_string(), Value::String(self.type_name.clone()));
            fields
                .entry("vid".to_string())
                .or_insert_with(|| Value::String(String::new()));
        }
        config
    }

    /// Build the runtime object for a config entry.
    pub fn construct(&self, ctx: &ConstructContext<'_>) -> Result<Box<dyn Target>> {
        (self.construct)(ctx)
    }

    /// Release the runtime object and everything it owned.
    pub fn dispose(&self, target: Box<dyn Target>) {
        (self.dispose)(target)
    }

    /// Route one patch to a command handler or the default operation.
    pub fn dispatch(&self, ctx: &mut ProcessContext<'_>) {
        let Some(mut table) = self.commands.table(ctx.patch.operate) else {
            self.default_operate(ctx);
            return;
        };

        let segments: Vec<String> = ctx.patch.segments().map(str::to_string).collect();
        for segment in &segments {
            match table.entries.get(segment) {
                Some(CommandNode::Handler(handler)) => {
                    handler(ctx);
                    return;
                }
                Some(CommandNode::Table(nested)) => {
                    table = nested;
                }
                None => {
                    if table.fallbacks.is_empty() {
                        self.default_operate(ctx);
                        return;
                    }
                    for (pattern, handler) in &table.fallbacks {
                        if pattern.is_match(segment) {
                            handler(ctx);
                            return;
                        }
                    }
                    // No fallback matched; keep scanning the remaining
                    // segments against this table.
                }
            }
        }

        self.default_operate(ctx);
    }

    /// Mirror the patch onto the live runtime object.
    fn default_operate(&self, ctx: &mut ProcessContext<'_>) {
        let mut cursor: &mut dyn Target = &mut *ctx.target;
        for segment in &ctx.patch.path {
            match Target::child_mut(cursor, segment) {
                Some(child) => cursor = child,
                None => {
                    warn!(
                        type_name = %self.type_name,
                        vid = %ctx.vid,
                        segment = %segment,
                        "runtime object diverged from config; skipping patch"
                    );
                    return;
                }
            }
        }

        let applied = match ctx.patch.operate {
            Operate::Add | Operate::Set => cursor.assign(&ctx.patch.key, &ctx.patch.value),
            Operate::Delete => cursor.remove_key(&ctx.patch.key),
        };
        if !applied {
            warn!(
                type_name = %self.type_name,
                vid = %ctx.vid,
                key = %ctx.patch.key,
                "runtime object rejected default operation; skipping patch"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Path;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn passthrough() -> Processor {
        Processor::new(
            "Widget",
            || json!({ "label": "", "depth": { "near": 0.0 } }),
            |ctx| Ok(Box::new(ctx.config.clone())),
            drop,
        )
    }

    fn patch(operate: Operate, path: &[&str], key: &str, value: Value) -> Patch {
        Patch {
            operate,
            path: path.iter().map(|s| s.to_string()).collect::<Path>(),
            key: key.to_string(),
            value,
        }
    }

    fn dispatch(processor: &Processor, target: &mut Value, patch: &Patch) {
        let links = LinkSet::new();
        let config = json!({});
        let mut ctx = ProcessContext {
            vid: "w1",
            config: &config,
            target,
            patch,
            links: &links,
        };
        processor.dispatch(&mut ctx);
    }

    #[test]
    fn default_set_mirrors_the_patch() {
        let processor = passthrough();
        let mut target = json!({ "depth": { "near": 0.0 } });

        dispatch(
            &processor,
            &mut target,
            &patch(Operate::Set, &["depth"], "near", json!(0.5)),
        );
        assert_eq!(target["depth"]["near"], 0.5);

        dispatch(
            &processor,
            &mut target,
            &patch(Operate::Delete, &[], "depth", json!(null)),
        );
        assert_eq!(target.get("depth"), None);
    }

    #[test]
    fn structural_mismatch_is_a_noop() {
        let processor = passthrough();
        let mut target = json!({ "depth": {} });

        dispatch(
            &processor,
            &mut target,
            &patch(Operate::Set, &["missing", "deep"], "x", json!(1)),
        );
        assert_eq!(target, json!({ "depth": {} }));
    }

    #[test]
    fn literal_command_preempts_default() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let seen = hits.clone();
        let processor = passthrough().with_commands(
            Commands::new().set(CommandTable::new().on("label", move |ctx| {
                seen.borrow_mut().push(ctx.patch.value.clone());
            })),
        );
        let mut target = json!({ "label": "old" });

        dispatch(
            &processor,
            &mut target,
            &patch(Operate::Set, &[], "label", json!("new")),
        );

        // Handler ran; default assignment did not.
        assert_eq!(*hits.borrow(), vec![json!("new")]);
        assert_eq!(target["label"], "old");
    }

    #[test]
    fn nested_tables_descend_by_path() {
        let hits = Rc::new(RefCell::new(0));
        let seen = hits.clone();
        let processor = passthrough().with_commands(
            Commands::new().set(
                CommandTable::new().nest(
                    "depth",
                    CommandTable::new().on("near", move |_| *seen.borrow_mut() += 1),
                ),
            ),
        );
        let mut target = json!({ "depth": { "near": 0.0, "far": 1.0 } });

        dispatch(
            &processor,
            &mut target,
            &patch(Operate::Set, &["depth"], "near", json!(0.5)),
        );
        assert_eq!(*hits.borrow(), 1);

        // An unrouted sibling still takes the default path.
        dispatch(
            &processor,
            &mut target,
            &patch(Operate::Set, &["depth"], "far", json!(2.0)),
        );
        assert_eq!(target["depth"]["far"], 2.0);
    }

    #[test]
    fn regex_fallbacks_catch_dynamic_keys_first_match_wins() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let first = hits.clone();
        let second = hits.clone();
        let processor = passthrough().with_commands(
            Commands::new().add(
                CommandTable::new().nest(
                    "layers",
                    CommandTable::new()
                        .on_match(Regex::new(r"^\d+$").unwrap(), move |ctx| {
                            first.borrow_mut().push(format!("index:{}", ctx.patch.key));
                        })
                        .on_match(Regex::new(r".*").unwrap(), move |_| {
                            second.borrow_mut().push("wildcard".to_string());
                        }),
                ),
            ),
        );
        let mut target = json!({ "layers": [] });

        dispatch(
            &processor,
            &mut target,
            &patch(Operate::Add, &["layers"], "2", json!("c")),
        );
        assert_eq!(*hits.borrow(), vec!["index:2"]);
    }

    #[test]
    fn default_config_carries_the_type_discriminator() {
        let processor = passthrough();
        let config = processor.default_config();
        assert_eq!(config["type"], "Widget");
        assert_eq!(config["vid"], "");
        assert_eq!(config["label"], "");
    }
}
