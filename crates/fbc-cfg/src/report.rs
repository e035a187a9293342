//! Human-readable CFG reports and Graphviz dumps.

use std::fmt;

use crate::cfg::{Cfg, EdgeKind, ProgramCfg};

impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "cfg `{}` ({} blocks, {} edges, {} gosub return points)",
            self.name,
            self.blocks.len(),
            self.edges.len(),
            self.gosub_return_blocks.len()
        )?;
        for (id, block) in self.blocks.iter_enumerated() {
            let mut flags = Vec::new();
            if block.is_entry {
                flags.push("entry");
            }
            if block.is_exit {
                flags.push("exit");
            }
            if block.is_loop_header {
                flags.push("loop-header");
            }
            if block.is_loop_exit {
                flags.push("loop-exit");
            }
            if block.is_terminated {
                flags.push("terminated");
            }
            if block.is_unreachable {
                flags.push("unreachable");
            }
            let mut lines: Vec<u32> = block.source_lines.iter().copied().collect();
            lines.sort_unstable();
            writeln!(
                f,
                "  b{} `{}` [{}] stmts={} lines={:?} preds={:?} succs={:?}",
                id.0,
                block.label,
                flags.join(","),
                block.statements.len(),
                lines,
                block.predecessors.iter().map(|b| b.0).collect::<Vec<_>>(),
                block.successors.iter().map(|b| b.0).collect::<Vec<_>>(),
            )?;
        }
        for edge in &self.edges {
            match edge.target {
                Some(t) => writeln!(
                    f,
                    "  b{} -> b{} {:?} `{}`",
                    edge.source.0, t.0, edge.kind, edge.label
                )?,
                None => writeln!(
                    f,
                    "  b{} -> <dynamic> {:?} `{}`",
                    edge.source.0, edge.kind, edge.label
                )?,
            }
        }
        if !self.unresolved_jumps.is_empty() {
            writeln!(f, "  unresolved: {:?}", self.unresolved_jumps)?;
        }
        Ok(())
    }
}

impl Cfg {
    /// Graphviz dump for debugging block shapes.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("digraph \"{}\" {{\n", self.name));
        out.push_str("  node [shape=box fontname=monospace];\n");
        for (id, block) in self.blocks.iter_enumerated() {
            let style = if block.is_unreachable {
                " style=dotted"
            } else if block.is_loop_header {
                " style=bold"
            } else {
                ""
            };
            out.push_str(&format!(
                "  b{} [label=\"b{}: {}\\n{} stmts\"{}];\n",
                id.0,
                id.0,
                block.label,
                block.statements.len(),
                style
            ));
        }
        for edge in &self.edges {
            if let Some(t) = edge.target {
                let style = match edge.kind {
                    EdgeKind::Exception => " style=dashed color=red",
                    EdgeKind::Call => " style=dashed",
                    _ => "",
                };
                out.push_str(&format!(
                    "  b{} -> b{} [label=\"{}\"{}];\n",
                    edge.source.0, t.0, edge.label, style
                ));
            }
        }
        out.push_str("}\n");
        out
    }
}

impl fmt::Display for ProgramCfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.main)?;
        for cfg in self.functions.values() {
            write!(f, "{}", cfg)?;
        }
        Ok(())
    }
}
