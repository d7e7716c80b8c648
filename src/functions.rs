//! The built-in implementations for the XPath 1.0 core function library.

use crate::datasource::{DomNode, NodeType};
use crate::engine::{
    round_half_up, sort_document_order, string_to_number, EvaluationContext, XPathValue,
};
use crate::error::XPathError;
use regex::Regex;
use std::collections::HashSet;

/// Dispatches a function call to the correct implementation.
///
/// Dispatch is by local name: any namespace prefix was already dropped by
/// the parser.
pub fn evaluate_function<'d, N: DomNode<'d>>(
    name: &str,
    args: Vec<XPathValue<N>>,
    ctx: &EvaluationContext<'d, N>,
) -> Result<XPathValue<N>, XPathError> {
    match name {
        // Node-set
        "last" => func_last(args, ctx),
        "position" => func_position(args, ctx),
        "count" => func_count(args),
        "id" => func_id(args, ctx),
        "local-name" => func_local_name(args, ctx),
        "namespace-uri" => func_namespace_uri(args, ctx),
        "name" => func_name(args, ctx),

        // String
        "string" => func_string(args, ctx),
        "concat" => func_concat(args),
        "starts-with" => func_starts_with(args),
        "ends-with" => func_ends_with(args),
        "contains" => func_contains(args),
        "substring-before" => func_substring_before(args),
        "substring-after" => func_substring_after(args),
        "substring" => func_substring(args),
        "string-length" => func_string_length(args, ctx),
        "normalize-space" => func_normalize_space(args, ctx),
        "translate" => func_translate(args),
        "matches" => func_matches(args),

        // Boolean
        "boolean" => func_boolean(args),
        "not" => func_not(args),
        "true" => func_true(args),
        "false" => func_false(args),
        "lang" => func_lang(args, ctx),

        // Number
        "number" => func_number(args, ctx),
        "sum" => func_sum(args),
        "floor" => func_floor(args),
        "ceiling" => func_ceiling(args),
        "round" => func_round(args),

        // Node tests that reached a call position read better with a
        // dedicated message than "unknown function".
        "node" | "comment" | "text" | "processing-instruction" => Err(XPathError::Function {
            function: name.to_string(),
            message: "This is a node-test, not a function.".to_string(),
        }),
        _ => Err(XPathError::UnknownFunction(name.to_string())),
    }
}

// --- Node-set functions ---

fn func_last<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
    ctx: &EvaluationContext<'d, N>,
) -> Result<XPathValue<N>, XPathError> {
    if !args.is_empty() {
        return Err(XPathError::arity("last()", "0"));
    }
    Ok(XPathValue::Number(ctx.size() as f64))
}

fn func_position<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
    ctx: &EvaluationContext<'d, N>,
) -> Result<XPathValue<N>, XPathError> {
    if !args.is_empty() {
        return Err(XPathError::arity("position()", "0"));
    }
    Ok(XPathValue::Number(ctx.position() as f64))
}

fn func_count<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() != 1 {
        return Err(XPathError::arity("count()", "1"));
    }
    let nodes = args.remove(0).into_node_set()?;
    Ok(XPathValue::Number(nodes.len() as f64))
}

fn func_id<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
    ctx: &EvaluationContext<'d, N>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() != 1 {
        return Err(XPathError::arity("id()", "1"));
    }

    // For a node-set argument every node contributes its tokens; anything
    // else is one whitespace-separated token list.
    let mut wanted: HashSet<String> = HashSet::new();
    match args.remove(0) {
        XPathValue::NodeSet(nodes) => {
            for node in nodes {
                wanted.extend(node.string_value().split_whitespace().map(str::to_string));
            }
        }
        other => {
            wanted.extend(other.to_string().split_whitespace().map(str::to_string));
        }
    }
    if wanted.is_empty() {
        return Ok(XPathValue::NodeSet(vec![]));
    }

    let mut results = Vec::new();
    let mut stack: Vec<N> = ctx.root_node.children().collect();
    while let Some(node) = stack.pop() {
        if node.node_type() == NodeType::Element {
            for attr in node.attributes() {
                let Some(qname) = attr.name() else { continue };
                let is_id = qname.local_part == "id"
                    && (qname.prefix.is_none() || qname.prefix == Some("xml"));
                if is_id && wanted.contains(attr.string_value().as_str()) {
                    results.push(node);
                    break;
                }
            }
        }
        stack.extend(node.children());
    }
    sort_document_order(&mut results);
    Ok(XPathValue::NodeSet(results))
}

/// The argument node for `local-name()`/`name()`/`namespace-uri()`: the
/// context node without arguments, otherwise the first node of the
/// node-set in document order.
fn name_target<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
    ctx: &EvaluationContext<'d, N>,
    function: &str,
) -> Result<Option<N>, XPathError> {
    if args.len() > 1 {
        return Err(XPathError::arity(function, "0 or 1"));
    }
    if args.is_empty() {
        return Ok(Some(ctx.context_node));
    }
    Ok(args.remove(0).into_node_set()?.into_iter().min())
}

fn func_local_name<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
    ctx: &EvaluationContext<'d, N>,
) -> Result<XPathValue<N>, XPathError> {
    let node = name_target(args, ctx, "local-name()")?;
    let name = node
        .and_then(|n| n.name().map(|q| q.local_part.to_string()))
        .unwrap_or_default();
    Ok(XPathValue::String(name))
}

fn func_namespace_uri<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
    ctx: &EvaluationContext<'d, N>,
) -> Result<XPathValue<N>, XPathError> {
    let node = name_target(args, ctx, "namespace-uri()")?;
    let uri = node
        .and_then(|n| n.namespace_uri().map(str::to_string))
        .unwrap_or_default();
    Ok(XPathValue::String(uri))
}

fn func_name<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
    ctx: &EvaluationContext<'d, N>,
) -> Result<XPathValue<N>, XPathError> {
    let node = name_target(args, ctx, "name()")?;
    let name = node
        .and_then(|n| n.name().map(|q| q.qualified()))
        .unwrap_or_default();
    Ok(XPathValue::String(name))
}

// --- String functions ---

fn func_string<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
    ctx: &EvaluationContext<'d, N>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() > 1 {
        return Err(XPathError::arity("string()", "0 or 1"));
    }
    let s = if args.is_empty() {
        ctx.context_node.string_value()
    } else {
        args.remove(0).to_string()
    };
    Ok(XPathValue::String(s))
}

fn func_concat<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() < 2 {
        return Err(XPathError::arity("concat()", "at least 2"));
    }
    let result = args.iter().map(|v| v.to_string()).collect::<String>();
    Ok(XPathValue::String(result))
}

fn two_strings<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
    function: &str,
) -> Result<(String, String), XPathError> {
    if args.len() != 2 {
        return Err(XPathError::arity(function, "2"));
    }
    let second = args.remove(1).to_string();
    let first = args.remove(0).to_string();
    Ok((first, second))
}

fn func_starts_with<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    let (s, prefix) = two_strings(args, "starts-with()")?;
    Ok(XPathValue::Boolean(s.starts_with(&prefix)))
}

fn func_ends_with<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    let (s, suffix) = two_strings(args, "ends-with()")?;
    Ok(XPathValue::Boolean(s.ends_with(&suffix)))
}

fn func_contains<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    let (s, needle) = two_strings(args, "contains()")?;
    Ok(XPathValue::Boolean(s.contains(&needle)))
}

fn func_substring_before<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    let (s, sep) = two_strings(args, "substring-before()")?;
    let result = match s.find(&sep) {
        Some(index) => s[..index].to_string(),
        None => String::new(),
    };
    Ok(XPathValue::String(result))
}

fn func_substring_after<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    let (s, sep) = two_strings(args, "substring-after()")?;
    let result = match s.find(&sep) {
        Some(index) => s[index + sep.len()..].to_string(),
        None => String::new(),
    };
    Ok(XPathValue::String(result))
}

fn func_substring<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    if !(2..=3).contains(&args.len()) {
        return Err(XPathError::arity("substring()", "2 or 3"));
    }
    let length = if args.len() == 3 {
        Some(args.remove(2).to_number())
    } else {
        None
    };
    let start = args.remove(1).to_number();
    let s = args.remove(0).to_string();

    // Positions are 1-based; start and length round half-up, and a
    // character is kept iff round(start) <= pos < round(start) + round(len).
    // Infinite length (e.g. `1 div 0`) keeps everything; NaN keeps nothing.
    let first = round_half_up(start);
    let last = match length {
        Some(l) => first + round_half_up(l),
        None => f64::INFINITY,
    };

    let result = s
        .chars()
        .enumerate()
        .filter_map(|(i, c)| {
            let pos = (i + 1) as f64;
            if pos >= first && pos < last {
                Some(c)
            } else {
                None
            }
        })
        .collect::<String>();
    Ok(XPathValue::String(result))
}

fn func_string_length<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
    ctx: &EvaluationContext<'d, N>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() > 1 {
        return Err(XPathError::arity("string-length()", "0 or 1"));
    }
    let s = if args.is_empty() {
        ctx.context_node.string_value()
    } else {
        args.remove(0).to_string()
    };
    Ok(XPathValue::Number(s.chars().count() as f64))
}

fn func_normalize_space<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
    ctx: &EvaluationContext<'d, N>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() > 1 {
        return Err(XPathError::arity("normalize-space()", "0 or 1"));
    }
    let s = if args.is_empty() {
        ctx.context_node.string_value()
    } else {
        args.remove(0).to_string()
    };
    let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(XPathValue::String(normalized))
}

fn func_translate<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() != 3 {
        return Err(XPathError::arity("translate()", "3"));
    }
    let to: Vec<char> = args.remove(2).to_string().chars().collect();
    let from: Vec<char> = args.remove(1).to_string().chars().collect();
    let source = args.remove(0).to_string();
    let result = source
        .chars()
        .filter_map(|c| match from.iter().position(|&fc| fc == c) {
            Some(index) => to.get(index).copied(),
            None => Some(c),
        })
        .collect::<String>();
    Ok(XPathValue::String(result))
}

fn func_matches<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    if !(2..=3).contains(&args.len()) {
        return Err(XPathError::arity("matches()", "2 or 3"));
    }
    let flags = if args.len() == 3 {
        args.remove(2).to_string()
    } else {
        String::new()
    };
    let pattern = args.remove(1).to_string();
    let input = args.remove(0).to_string();

    // Only the case-insensitivity flag is supported.
    if !flags.chars().all(|c| c == 'i') {
        return Err(XPathError::InvalidRegexFlags(flags));
    }
    let full_pattern = if flags.contains('i') {
        format!("(?i){}", pattern)
    } else {
        pattern.clone()
    };
    let re =
        Regex::new(&full_pattern).map_err(|_| XPathError::InvalidRegexPattern(pattern))?;
    Ok(XPathValue::Boolean(re.is_match(&input)))
}

// --- Boolean functions ---

fn func_boolean<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() != 1 {
        return Err(XPathError::arity("boolean()", "1"));
    }
    Ok(XPathValue::Boolean(args[0].to_bool()))
}

fn func_not<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() != 1 {
        return Err(XPathError::arity("not()", "1"));
    }
    Ok(XPathValue::Boolean(!args[0].to_bool()))
}

fn func_true<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    if !args.is_empty() {
        return Err(XPathError::arity("true()", "0"));
    }
    Ok(XPathValue::Boolean(true))
}

fn func_false<'d, N: DomNode<'d>>(
    args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    if !args.is_empty() {
        return Err(XPathError::arity("false()", "0"));
    }
    Ok(XPathValue::Boolean(false))
}

fn func_lang<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
    ctx: &EvaluationContext<'d, N>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() != 1 {
        return Err(XPathError::arity("lang()", "1"));
    }
    let wanted = args.remove(0).to_string().to_lowercase();
    let mut current = Some(ctx.context_node);

    // Non-element context nodes inherit from their parent element.
    if current.is_some_and(|n| n.node_type() != NodeType::Element) {
        current = current.and_then(|n| n.parent());
    }

    while let Some(node) = current {
        for attr in node.attributes() {
            let Some(qname) = attr.name() else { continue };
            if qname.prefix == Some("xml") && qname.local_part == "lang" {
                let lang = attr.string_value().to_lowercase();
                // Exact match or a subcode: "en" matches "en-GB".
                let matched =
                    lang == wanted || lang.starts_with(&format!("{}-", wanted));
                return Ok(XPathValue::Boolean(matched));
            }
        }
        current = node.parent();
    }
    Ok(XPathValue::Boolean(false))
}

// --- Number functions ---

fn func_number<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
    ctx: &EvaluationContext<'d, N>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() > 1 {
        return Err(XPathError::arity("number()", "0 or 1"));
    }
    let n = if args.is_empty() {
        string_to_number(&ctx.context_node.string_value())
    } else {
        args.remove(0).to_number()
    };
    Ok(XPathValue::Number(n))
}

fn func_sum<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() != 1 {
        return Err(XPathError::arity("sum()", "1"));
    }
    let nodes = args.remove(0).into_node_set()?;
    let sum = nodes
        .iter()
        .map(|node| string_to_number(&node.string_value()))
        .sum();
    Ok(XPathValue::Number(sum))
}

fn func_floor<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() != 1 {
        return Err(XPathError::arity("floor()", "1"));
    }
    Ok(XPathValue::Number(args.remove(0).to_number().floor()))
}

fn func_ceiling<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() != 1 {
        return Err(XPathError::arity("ceiling()", "1"));
    }
    Ok(XPathValue::Number(args.remove(0).to_number().ceil()))
}

fn func_round<'d, N: DomNode<'d>>(
    mut args: Vec<XPathValue<N>>,
) -> Result<XPathValue<N>, XPathError> {
    if args.len() != 1 {
        return Err(XPathError::arity("round()", "1"));
    }
    Ok(XPathValue::Number(round_half_up(args.remove(0).to_number())))
}
