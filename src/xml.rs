//! XML rendering of event trees.
//!
//! Produces the traditional evio dump form: one element per structure,
//! named after its data type (or its dictionary name when one resolves),
//! with `content`, `data_type`, `tag`, and `num` attributes and the decoded
//! payload as indented text. Unknown payloads render as hex words inside
//! the element.
//!
//! This is presentation output for people and diff tools, not a wire
//! format; nothing in the crate parses it back.

use crate::buffer::Endian;
use crate::dictionary::EvioDictionary;
use crate::structure::{EvioTree, NodeId, Payload};
use crate::util::hex;

/// Render the subtree at `root` as XML.
///
/// When `dictionary` is given, structures whose tag/num resolve to a name
/// use that name as their element tag.
pub fn tree_to_xml(tree: &EvioTree, root: NodeId, dictionary: Option<&EvioDictionary>) -> String {
    let mut out = String::new();
    render(tree, root, dictionary, 0, &mut out);
    out
}

fn element_name(tree: &EvioTree, id: NodeId, dictionary: Option<&EvioDictionary>) -> String {
    let node = tree.node(id);
    if let Some(dict) = dictionary {
        if let Some(name) = dict.name(node.header.tag, node.header.num) {
            return name.to_string();
        }
    }
    if node.is_container() {
        format!("{:?}", node.header.kind).to_lowercase()
    } else {
        node.header.data_type.name().to_string()
    }
}

fn render(
    tree: &EvioTree,
    id: NodeId,
    dictionary: Option<&EvioDictionary>,
    depth: usize,
    out: &mut String,
) {
    let node = tree.node(id);
    let pad = "   ".repeat(depth);
    let name = element_name(tree, id, dictionary);

    out.push_str(&pad);
    out.push('<');
    out.push_str(&name);
    out.push_str(&format!(
        " content=\"{}\" data_type=\"0x{:x}\" tag=\"{}\"",
        node.header.data_type.name(),
        node.header.data_type.code(),
        node.header.tag
    ));
    if matches!(node.header.kind, crate::header::StructureKind::Bank) {
        out.push_str(&format!(" num=\"{}\"", node.header.num));
    }
    out.push_str(">\n");

    if node.is_container() {
        for &child in node.children() {
            render(tree, child, dictionary, depth + 1, out);
        }
    } else {
        render_payload(node.payload(), depth + 1, out);
    }

    out.push_str(&pad);
    out.push_str(&format!("</{}>\n", name));
}

fn render_payload(payload: &Payload, depth: usize, out: &mut String) {
    let pad = "   ".repeat(depth);
    match payload {
        Payload::None => {}
        Payload::Raw(v) => {
            for line in hex::word_dump(v, Endian::Big).lines() {
                out.push_str(&pad);
                out.push_str(line);
                out.push('\n');
            }
        }
        Payload::Uint32(v) => push_row(out, &pad, v.iter().map(|x| hex::format_hex32(*x))),
        Payload::Int32(v) => push_row(out, &pad, v.iter().map(|x| x.to_string())),
        Payload::Float32(v) => push_row(out, &pad, v.iter().map(|x| format!("{:e}", x))),
        Payload::Double64(v) => push_row(out, &pad, v.iter().map(|x| format!("{:e}", x))),
        Payload::Short16(v) => push_row(out, &pad, v.iter().map(|x| x.to_string())),
        Payload::Ushort16(v) => push_row(out, &pad, v.iter().map(|x| format!("0x{:04x}", x))),
        Payload::Char8(v) => push_row(out, &pad, v.iter().map(|x| x.to_string())),
        Payload::Uchar8(v) => push_row(out, &pad, v.iter().map(|x| format!("0x{:02x}", x))),
        Payload::Long64(v) => push_row(out, &pad, v.iter().map(|x| x.to_string())),
        Payload::Ulong64(v) => push_row(out, &pad, v.iter().map(|x| format!("0x{:016x}", x))),
        Payload::Strings(v) => {
            for s in v {
                out.push_str(&pad);
                out.push_str(&format!("<![CDATA[{}]]>\n", s));
            }
        }
        Payload::Composite(v) => {
            for cd in v {
                out.push_str(&pad);
                out.push_str(&format!("<composite format=\"{}\">\n", cd.format()));
                push_row(
                    out,
                    &format!("{}   ", pad),
                    cd.items().iter().map(|i| format!("{:?}", i)),
                );
                out.push_str(&pad);
                out.push_str("</composite>\n");
            }
        }
    }
}

/// Emit values eight to a line, indented.
fn push_row(out: &mut String, pad: &str, values: impl Iterator<Item = String>) {
    let mut count = 0usize;
    for value in values {
        if count % 8 == 0 {
            if count > 0 {
                out.push('\n');
            }
            out.push_str(pad);
        } else {
            out.push(' ');
        }
        out.push_str(&value);
        count += 1;
    }
    if count > 0 {
        out.push('\n');
    }
}
