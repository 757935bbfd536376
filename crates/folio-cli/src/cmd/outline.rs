use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use folio_core::outline::{ListKind, Node, OutlineEntry, Placed, table_of_contents};
use folio_core::{Uid, parse_blocks};
use serde::Serialize;

use super::read_snapshot;
use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct OutlineArgs {
    /// Block snapshot to parse.
    pub file: PathBuf,

    /// Uid of the block being dragged.
    #[arg(long, value_name = "UID")]
    pub dragged: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutlineOutput<'a> {
    toc: Vec<OutlineEntry>,
    tree: Vec<Node<'a>>,
}

/// Print the section tree of a snapshot.
///
/// # Errors
///
/// Returns an error when the snapshot cannot be read.
pub fn run_outline(args: &OutlineArgs, output: OutputMode) -> Result<()> {
    let blocks = read_snapshot(&args.file)?;
    let dragged = args.dragged.as_deref().map(Uid::from);
    let tree = parse_blocks(&blocks, dragged.as_ref());
    let value = OutlineOutput {
        toc: table_of_contents(&tree),
        tree,
    };

    render_mode(
        output,
        &value,
        |v, w| write_tree(w, &v.tree, 0),
        |v, w| {
            pretty_section(w, "Contents")?;
            for entry in &v.toc {
                writeln!(w, "{}{}", "  ".repeat(entry.depth), entry.title)?;
            }
            writeln!(w)?;
            pretty_section(w, "Blocks")?;
            write_tree(w, &v.tree, 0)
        },
    )
}

/// One line per node, children indented two spaces. Dragged blocks get a
/// trailing `*`.
fn write_tree(w: &mut dyn Write, nodes: &[Node<'_>], depth: usize) -> io::Result<()> {
    let indent = "  ".repeat(depth);
    for node in nodes {
        match node {
            Node::Section { heading, children } => {
                let title = heading.block.text_value().unwrap_or_default();
                writeln!(w, "{indent}{} {title:?}", label(heading))?;
                write_tree(w, children, depth + 1)?;
            }
            Node::List { kind, items } => {
                let kind = match kind {
                    ListKind::Ordered => "ol",
                    ListKind::Unordered => "ul",
                };
                writeln!(w, "{indent}{kind}")?;
                for item in items {
                    writeln!(w, "{indent}  {}", label(item))?;
                }
            }
            Node::Leaf(placed) => writeln!(w, "{indent}{}", label(placed))?,
        }
    }
    Ok(())
}

fn label(placed: &Placed<'_>) -> String {
    let mark = if placed.being_dragged { "*" } else { "" };
    format!("{} {}{mark}", placed.block.kind.as_str(), placed.block.uid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{Block, BlockType};

    fn block(kind: BlockType, uid: &str, value: &str) -> Block {
        Block::text(kind, value).with_uid(uid)
    }

    #[test]
    fn tree_lines_are_indented_by_depth() {
        let blocks = vec![
            block(BlockType::Section, "s", "Intro"),
            block(BlockType::Paragraph, "p", "x"),
            block(BlockType::UnorderedItem, "l1", "a"),
            block(BlockType::UnorderedItem, "l2", "b"),
        ];
        let dragged = Uid::from("s");
        let tree = parse_blocks(&blocks, Some(&dragged));
        let mut buf = Vec::new();
        write_tree(&mut buf, &tree, 0).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(
            text,
            "section s* \"Intro\"\n  paragraph p*\n  ul\n    uli l1*\n    uli l2*\n"
        );
    }
}
