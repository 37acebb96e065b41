//! Control-flow-graph collaborator
//!
//! The aggregator needs very little from the CFG produced by the
//! instrumentation pipeline: resolve a `(module, function | basic block)`
//! identity to a node, find a function's first basic block, check whether a
//! basic block statically calls a function, and materialize placeholder nodes
//! for code the pipeline never saw. The graph is stored as an arena of nodes
//! addressed by stable integer indices with an explicit tagged variant per
//! node kind.
//!
//! Foreign code (libc, handwritten assembly, another image) lands under a
//! reserved external module. Placeholder functions there are qualified by the
//! owning ELF on multi-image runs and by the core for non-zero cores, so the
//! same foreign PC maps to the same identity across passes.

use crate::domain::CfgError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Module id reserved for dynamically discovered foreign code.
pub const EXTERNAL_MODULE: &str = "external";

/// Stable index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug)]
pub struct Node {
    /// Identity within the parent scope (module id, function id, bb id).
    pub id: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

#[derive(Debug)]
pub enum NodeKind {
    Module,
    Function {
        /// Entry basic block, if the pipeline emitted one.
        first_bb: Option<NodeId>,
    },
    BasicBlock {
        /// Function ids this block contains static calls to.
        calls: Vec<String>,
    },
    Loop {
        /// Iteration count attached by a call-graph trace import.
        count: u64,
    },
}

pub struct Cfg {
    nodes: Vec<Node>,
    modules: HashMap<String, NodeId>,
    /// Function id → node, global like the pipeline's function namespace.
    functions: HashMap<String, NodeId>,
    /// (module node, bb id) → node.
    basic_blocks: HashMap<(NodeId, String), NodeId>,
    external: NodeId,
}

impl Default for Cfg {
    fn default() -> Self {
        Self::new()
    }
}

impl Cfg {
    #[must_use]
    pub fn new() -> Self {
        let mut cfg = Self {
            nodes: Vec::new(),
            modules: HashMap::new(),
            functions: HashMap::new(),
            basic_blocks: HashMap::new(),
            external: NodeId(0),
        };
        cfg.external = cfg.add_module(EXTERNAL_MODULE);
        cfg
    }

    /// Load the interchange file emitted by the instrumentation pipeline.
    pub fn from_json_file(path: &Path) -> Result<Self, CfgError> {
        let text = std::fs::read_to_string(path).map_err(|source| CfgError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, CfgError> {
        let file: CfgFile = serde_json::from_str(text)?;
        let mut cfg = Self::new();
        for module in file.modules {
            let module_node = cfg.add_module(&module.id);
            for function in module.functions {
                let function_node = cfg.add_function(module_node, &function.id);
                for bb in function.basic_blocks {
                    let parent = if bb.in_loop {
                        cfg.add_loop(function_node, &format!("loop_{}", bb.id))
                    } else {
                        function_node
                    };
                    cfg.add_basic_block(module_node, parent, &bb.id, bb.calls);
                }
            }
        }
        Ok(cfg)
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("CFG arena overflow"));
        self.nodes.push(node);
        id
    }

    pub fn add_module(&mut self, id: &str) -> NodeId {
        if let Some(&existing) = self.modules.get(id) {
            return existing;
        }
        let node = self.push(Node { id: id.to_string(), parent: None, kind: NodeKind::Module });
        self.modules.insert(id.to_string(), node);
        node
    }

    pub fn add_function(&mut self, module: NodeId, id: &str) -> NodeId {
        if let Some(&existing) = self.functions.get(id) {
            return existing;
        }
        let node = self.push(Node {
            id: id.to_string(),
            parent: Some(module),
            kind: NodeKind::Function { first_bb: None },
        });
        self.functions.insert(id.to_string(), node);
        node
    }

    pub fn add_loop(&mut self, function: NodeId, id: &str) -> NodeId {
        self.push(Node {
            id: id.to_string(),
            parent: Some(function),
            kind: NodeKind::Loop { count: 0 },
        })
    }

    /// Add a basic block under `parent` (its function or enclosing loop).
    /// The first block added to a function becomes its entry block.
    pub fn add_basic_block(
        &mut self,
        module: NodeId,
        parent: NodeId,
        id: &str,
        calls: Vec<String>,
    ) -> NodeId {
        if let Some(&existing) = self.basic_blocks.get(&(module, id.to_string())) {
            return existing;
        }
        let node = self.push(Node {
            id: id.to_string(),
            parent: Some(parent),
            kind: NodeKind::BasicBlock { calls },
        });
        self.basic_blocks.insert((module, id.to_string()), node);

        let function = self.enclosing_function(node).expect("basic block outside any function");
        if let NodeKind::Function { first_bb } = &mut self.nodes[function.0 as usize].kind {
            if first_bb.is_none() {
                *first_bb = Some(node);
            }
        }
        node
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    #[must_use]
    pub fn module(&self, id: &str) -> Option<NodeId> {
        self.modules.get(id).copied()
    }

    #[must_use]
    pub fn function(&self, id: &str) -> Option<NodeId> {
        self.functions.get(id).copied()
    }

    #[must_use]
    pub fn basic_block(&self, module: NodeId, id: &str) -> Option<NodeId> {
        self.basic_blocks.get(&(module, id.to_string())).copied()
    }

    #[must_use]
    pub fn external_module(&self) -> NodeId {
        self.external
    }

    #[must_use]
    pub fn first_bb(&self, function: NodeId) -> Option<NodeId> {
        match self.node(function).kind {
            NodeKind::Function { first_bb } => first_bb,
            _ => None,
        }
    }

    /// Walk parents up to the function owning a node.
    #[must_use]
    pub fn enclosing_function(&self, mut id: NodeId) -> Option<NodeId> {
        loop {
            let node = self.node(id);
            if matches!(node.kind, NodeKind::Function { .. }) {
                return Some(id);
            }
            id = node.parent?;
        }
    }

    /// Walk parents up to the module owning a node.
    #[must_use]
    pub fn enclosing_module(&self, mut id: NodeId) -> Option<NodeId> {
        loop {
            let node = self.node(id);
            if matches!(node.kind, NodeKind::Module) {
                return Some(id);
            }
            id = node.parent?;
        }
    }

    /// Does `bb` contain a static call to `function_id`?
    #[must_use]
    pub fn block_calls(&self, bb: NodeId, function_id: &str) -> bool {
        match &self.node(bb).kind {
            NodeKind::BasicBlock { calls } => calls.iter().any(|c| c == function_id),
            _ => false,
        }
    }

    /// Attach a trace-supplied iteration count to the loop enclosing `bb`.
    /// Returns false when no enclosing loop exists (logged by the caller).
    pub fn set_loop_count(&mut self, bb: NodeId, count: u64) -> bool {
        let mut cursor = self.node(bb).parent;
        while let Some(id) = cursor {
            if let NodeKind::Loop { count: c } = &mut self.nodes[id.0 as usize].kind {
                *c = count;
                return true;
            }
            cursor = self.node(id).parent;
        }
        false
    }

    /// Placeholder name for foreign code: ELF-qualified when several images
    /// are loaded, core-qualified off core 0.
    #[must_use]
    pub fn qualify_external(function: &str, core: usize, elf: Option<&str>) -> String {
        let mut name = match elf {
            Some(elf) => format!("{elf}:{function}"),
            None => function.to_string(),
        };
        if core != 0 {
            name = format!("{name}@core{core}");
        }
        name
    }

    /// Get or synthesize the placeholder `(function, basic block)` pair for a
    /// foreign function under the external module.
    pub fn external_function(&mut self, name: &str) -> (NodeId, NodeId) {
        if let Some(function) = self.functions.get(name).copied() {
            if let Some(bb) = self.first_bb(function) {
                return (function, bb);
            }
        }
        let external = self.external;
        let function = self.add_function(external, name);
        // Mirror the pipeline's ordinal bb naming for synthesized blocks.
        let bb_id = format!("{}", self.nodes.len());
        let bb = self.add_basic_block(external, function, &bb_id, Vec::new());
        (function, bb)
    }

    /// Re-create placeholder nodes from persisted external location rows so a
    /// resumed run maps foreign code to the identities already on disk.
    pub fn seed_external_functions<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let external = self.external;
        for (function_id, bb_id) in rows {
            if self.functions.contains_key(&function_id) {
                continue;
            }
            let function = self.add_function(external, &function_id);
            let bb_id =
                if bb_id.is_empty() { format!("{}", self.nodes.len()) } else { bb_id };
            self.add_basic_block(external, function, &bb_id, Vec::new());
        }
    }
}

// Interchange file format (serde shapes only; the arena is built above).

#[derive(Debug, Deserialize)]
struct CfgFile {
    modules: Vec<ModuleEntry>,
}

#[derive(Debug, Deserialize)]
struct ModuleEntry {
    id: String,
    #[serde(default)]
    functions: Vec<FunctionEntry>,
}

#[derive(Debug, Deserialize)]
struct FunctionEntry {
    id: String,
    #[serde(default)]
    basic_blocks: Vec<BasicBlockEntry>,
}

#[derive(Debug, Deserialize)]
struct BasicBlockEntry {
    id: String,
    #[serde(default)]
    calls: Vec<String>,
    #[serde(default, rename = "loop")]
    in_loop: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cfg() -> Cfg {
        Cfg::from_json(
            r#"{
                "modules": [{
                    "id": "main.c",
                    "functions": [
                        {"id": "main", "basic_blocks": [
                            {"id": "1", "calls": ["helper"]},
                            {"id": "2", "calls": [], "loop": true}
                        ]},
                        {"id": "helper", "basic_blocks": [{"id": "3"}]}
                    ]
                }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn lookups_resolve_loaded_nodes() {
        let cfg = sample_cfg();
        let module = cfg.module("main.c").unwrap();
        let main = cfg.function("main").unwrap();
        let bb1 = cfg.basic_block(module, "1").unwrap();
        assert_eq!(cfg.first_bb(main), Some(bb1));
        assert_eq!(cfg.enclosing_function(bb1), Some(main));
        assert_eq!(cfg.enclosing_module(bb1), Some(module));
    }

    #[test]
    fn call_containment_check() {
        let cfg = sample_cfg();
        let module = cfg.module("main.c").unwrap();
        let bb1 = cfg.basic_block(module, "1").unwrap();
        assert!(cfg.block_calls(bb1, "helper"));
        assert!(!cfg.block_calls(bb1, "main"));
    }

    #[test]
    fn loop_count_attaches_to_enclosing_loop() {
        let mut cfg = sample_cfg();
        let module = cfg.module("main.c").unwrap();
        let looped = cfg.basic_block(module, "2").unwrap();
        let plain = cfg.basic_block(module, "1").unwrap();
        assert!(cfg.set_loop_count(looped, 17));
        assert!(!cfg.set_loop_count(plain, 17));
    }

    #[test]
    fn external_synthesis_is_idempotent() {
        let mut cfg = Cfg::new();
        let (f1, b1) = cfg.external_function("memcpy");
        let (f2, b2) = cfg.external_function("memcpy");
        assert_eq!(f1, f2);
        assert_eq!(b1, b2);
        assert_eq!(cfg.enclosing_module(b1), Some(cfg.external_module()));
    }

    #[test]
    fn external_names_are_qualified() {
        assert_eq!(Cfg::qualify_external("memcpy", 0, None), "memcpy");
        assert_eq!(Cfg::qualify_external("memcpy", 2, None), "memcpy@core2");
        assert_eq!(Cfg::qualify_external("memcpy", 0, Some("libm.so")), "libm.so:memcpy");
        assert_eq!(Cfg::qualify_external("memcpy", 1, Some("libm.so")), "libm.so:memcpy@core1");
    }

    #[test]
    fn seeding_restores_persisted_placeholders() {
        let mut cfg = Cfg::new();
        cfg.seed_external_functions(vec![("memcpy".to_string(), "42".to_string())]);
        let function = cfg.function("memcpy").unwrap();
        let bb = cfg.first_bb(function).unwrap();
        assert_eq!(cfg.node(bb).id, "42");
        // A later resolve reuses the seeded pair instead of minting a new one.
        let (f2, b2) = cfg.external_function("memcpy");
        assert_eq!((f2, b2), (function, bb));
    }
}
