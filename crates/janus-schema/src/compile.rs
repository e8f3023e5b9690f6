//! JSON Schema → automaton compilation.
//!
//! The schema is decomposed recursively into per-field grammar fragments
//! (string/enum/number/object/array), composed into one NFA, and
//! determinized. Object properties are emitted in declaration order and all
//! declared properties are emitted; the result is strictly narrower than
//! the schema, so every completed output remains schema-valid.

use janus_core::{Error, Result};
use serde_json::Value;

use crate::automaton::{CharRange, ConstraintAutomaton, Frag, Nfa};

/// Maximum nesting depth before a schema is rejected as unsupported.
const MAX_DEPTH: usize = 16;

/// Keywords the engine refuses rather than silently ignoring.
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "$ref",
    "$defs",
    "definitions",
    "anyOf",
    "oneOf",
    "allOf",
    "not",
    "pattern",
    "patternProperties",
    "format",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minItems",
    "maxItems",
    "uniqueItems",
    "minLength",
    "maxLength",
    "if",
    "then",
    "else",
];

/// Compiles a JSON Schema into a [`ConstraintAutomaton`].
///
/// # Errors
///
/// Returns [`Error::UnsupportedSchema`] for constructs outside the
/// supported subset, including nesting beyond the depth cap.
pub fn compile(schema: &Value) -> Result<ConstraintAutomaton> {
    let mut nfa = Nfa::new();
    let frag = value_frag(&mut nfa, schema, 0)?;
    Ok(ConstraintAutomaton::determinize(&nfa, frag.start, frag.end))
}

fn value_frag(nfa: &mut Nfa, schema: &Value, depth: usize) -> Result<Frag> {
    if depth > MAX_DEPTH {
        return Err(Error::unsupported_schema(format!(
            "schema nesting exceeds the supported depth of {MAX_DEPTH}"
        )));
    }

    let obj = schema
        .as_object()
        .ok_or_else(|| Error::unsupported_schema("schema node must be a JSON object"))?;

    for key in UNSUPPORTED_KEYWORDS {
        if obj.contains_key(*key) {
            return Err(Error::unsupported_schema(format!(
                "keyword \"{key}\" is not supported"
            )));
        }
    }

    if let Some(values) = obj.get("enum") {
        return enum_frag(nfa, values);
    }
    if let Some(value) = obj.get("const") {
        return scalar_literal(nfa, value);
    }

    let ty = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::unsupported_schema("schema node needs a string \"type\""))?;

    match ty {
        "object" => object_frag(nfa, obj, depth),
        "array" => array_frag(nfa, obj, depth),
        "string" => Ok(string_frag(nfa)),
        "integer" => Ok(integer_frag(nfa)),
        "number" => Ok(number_frag(nfa)),
        "boolean" => {
            let t = nfa.lit("true");
            let f = nfa.lit("false");
            Ok(nfa.alt(&[t, f]))
        }
        "null" => Ok(nfa.lit("null")),
        other => Err(Error::unsupported_schema(format!(
            "type \"{other}\" is not supported"
        ))),
    }
}

fn enum_frag(nfa: &mut Nfa, values: &Value) -> Result<Frag> {
    let entries = values
        .as_array()
        .ok_or_else(|| Error::unsupported_schema("\"enum\" must be an array"))?;
    if entries.is_empty() {
        return Err(Error::unsupported_schema("\"enum\" must not be empty"));
    }
    let mut options = Vec::with_capacity(entries.len());
    for entry in entries {
        options.push(scalar_literal(nfa, entry)?);
    }
    Ok(nfa.alt(&options))
}

fn scalar_literal(nfa: &mut Nfa, value: &Value) -> Result<Frag> {
    if value.is_object() || value.is_array() {
        return Err(Error::unsupported_schema(
            "enum/const entries must be scalar values",
        ));
    }
    // serde_json renders the canonical JSON text, escapes included.
    let text = serde_json::to_string(value)?;
    Ok(nfa.lit(&text))
}

fn object_frag(
    nfa: &mut Nfa,
    obj: &serde_json::Map<String, Value>,
    depth: usize,
) -> Result<Frag> {
    if obj.get("additionalProperties").and_then(Value::as_bool) == Some(true) {
        return Err(Error::unsupported_schema(
            "open objects (additionalProperties: true) are not supported",
        ));
    }

    let empty = serde_json::Map::new();
    let properties = match obj.get("properties") {
        Some(Value::Object(props)) => props,
        Some(_) => {
            return Err(Error::unsupported_schema("\"properties\" must be an object"));
        }
        None => &empty,
    };

    if let Some(required) = obj.get("required") {
        let names = required
            .as_array()
            .ok_or_else(|| Error::unsupported_schema("\"required\" must be an array"))?;
        for name in names {
            let name = name
                .as_str()
                .ok_or_else(|| Error::unsupported_schema("\"required\" entries must be strings"))?;
            if !properties.contains_key(name) {
                return Err(Error::unsupported_schema(format!(
                    "required property \"{name}\" is not declared in \"properties\""
                )));
            }
        }
    }

    let mut frag = nfa.lit("{");
    let ws = ws_frag(nfa);
    frag = nfa.seq(frag, ws);

    let mut first = true;
    // Declaration order; serde_json preserves it.
    for (key, prop_schema) in properties {
        if !first {
            let comma = nfa.lit(",");
            let ws = ws_frag(nfa);
            frag = nfa.seq(frag, comma);
            frag = nfa.seq(frag, ws);
        }
        first = false;

        let key_lit = serde_json::to_string(key)?;
        let key_frag = nfa.lit(&key_lit);
        frag = nfa.seq(frag, key_frag);
        let ws = ws_frag(nfa);
        frag = nfa.seq(frag, ws);
        let colon = nfa.lit(":");
        frag = nfa.seq(frag, colon);
        let ws = ws_frag(nfa);
        frag = nfa.seq(frag, ws);

        let value = value_frag(nfa, prop_schema, depth + 1)?;
        frag = nfa.seq(frag, value);
        let ws = ws_frag(nfa);
        frag = nfa.seq(frag, ws);
    }

    let close = nfa.lit("}");
    Ok(nfa.seq(frag, close))
}

fn array_frag(
    nfa: &mut Nfa,
    obj: &serde_json::Map<String, Value>,
    depth: usize,
) -> Result<Frag> {
    let items = obj
        .get("items")
        .ok_or_else(|| Error::unsupported_schema("arrays need an \"items\" schema"))?;

    let mut frag = nfa.lit("[");
    let ws = ws_frag(nfa);
    frag = nfa.seq(frag, ws);

    // item ( ws "," ws item )* ws, with the whole list optional.
    let first = value_frag(nfa, items, depth + 1)?;
    let ws = ws_frag(nfa);
    let comma = nfa.lit(",");
    let ws2 = ws_frag(nfa);
    let next = value_frag(nfa, items, depth + 1)?;
    let mut sep = nfa.seq(ws, comma);
    sep = nfa.seq(sep, ws2);
    sep = nfa.seq(sep, next);
    let more = nfa.star(sep);
    let trailing_ws = ws_frag(nfa);
    let mut list = nfa.seq(first, more);
    list = nfa.seq(list, trailing_ws);
    let list = nfa.opt(list);
    frag = nfa.seq(frag, list);

    let close = nfa.lit("]");
    Ok(nfa.seq(frag, close))
}

fn string_frag(nfa: &mut Nfa) -> Frag {
    let open = nfa.lit("\"");

    // Any character except the quote, the backslash, and raw control chars.
    let normal = nfa.class(&[
        CharRange::new(' ', '!'),
        CharRange::new('#', '['),
        CharRange::new(']', char::MAX),
    ]);

    // \" \\ \/ \b \f \n \r \t and \uXXXX.
    let backslash = nfa.lit("\\");
    let simple = nfa.class(&[
        CharRange::single('"'),
        CharRange::single('\\'),
        CharRange::single('/'),
        CharRange::single('b'),
        CharRange::single('f'),
        CharRange::single('n'),
        CharRange::single('r'),
        CharRange::single('t'),
    ]);
    let u = nfa.lit("u");
    let hex = nfa.class(&[
        CharRange::new('0', '9'),
        CharRange::new('a', 'f'),
        CharRange::new('A', 'F'),
    ]);
    let hex2 = nfa.class(&[
        CharRange::new('0', '9'),
        CharRange::new('a', 'f'),
        CharRange::new('A', 'F'),
    ]);
    let hex3 = nfa.class(&[
        CharRange::new('0', '9'),
        CharRange::new('a', 'f'),
        CharRange::new('A', 'F'),
    ]);
    let hex4 = nfa.class(&[
        CharRange::new('0', '9'),
        CharRange::new('a', 'f'),
        CharRange::new('A', 'F'),
    ]);
    let mut unicode = nfa.seq(u, hex);
    unicode = nfa.seq(unicode, hex2);
    unicode = nfa.seq(unicode, hex3);
    unicode = nfa.seq(unicode, hex4);
    let escape_body = nfa.alt(&[simple, unicode]);
    let escape = nfa.seq(backslash, escape_body);

    let ch = nfa.alt(&[normal, escape]);
    let body = nfa.star(ch);
    let close = nfa.lit("\"");

    let mut frag = nfa.seq(open, body);
    frag = nfa.seq(frag, close);
    frag
}

fn integer_frag(nfa: &mut Nfa) -> Frag {
    let minus = nfa.lit("-");
    let sign = nfa.opt(minus);

    let zero = nfa.lit("0");
    let nonzero = nfa.class(&[CharRange::new('1', '9')]);
    let digit = nfa.class(&[CharRange::new('0', '9')]);
    let rest = nfa.star(digit);
    let multi = nfa.seq(nonzero, rest);
    let magnitude = nfa.alt(&[zero, multi]);

    nfa.seq(sign, magnitude)
}

fn number_frag(nfa: &mut Nfa) -> Frag {
    let int = integer_frag(nfa);

    let dot = nfa.lit(".");
    let frac_digit = nfa.class(&[CharRange::new('0', '9')]);
    let frac_digits = nfa.plus(frac_digit);
    let frac = nfa.seq(dot, frac_digits);
    let frac = nfa.opt(frac);

    let e = nfa.class(&[CharRange::single('e'), CharRange::single('E')]);
    let sign = nfa.class(&[CharRange::single('+'), CharRange::single('-')]);
    let sign = nfa.opt(sign);
    let exp_digit = nfa.class(&[CharRange::new('0', '9')]);
    let exp_digits = nfa.plus(exp_digit);
    let mut exp = nfa.seq(e, sign);
    exp = nfa.seq(exp, exp_digits);
    let exp = nfa.opt(exp);

    let mut frag = nfa.seq(int, frac);
    frag = nfa.seq(frag, exp);
    frag
}

fn ws_frag(nfa: &mut Nfa) -> Frag {
    let ws = nfa.class(&[
        CharRange::single(' '),
        CharRange::single('\t'),
        CharRange::single('\n'),
        CharRange::single('\r'),
    ]);
    nfa.star(ws)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::Step;
    use serde_json::json;

    fn assert_completes(automaton: &ConstraintAutomaton, text: &str) {
        let mut state = automaton.start_state();
        match automaton.advance(state, text) {
            Step::Complete { consumed, .. } => {
                assert_eq!(consumed, text.len(), "unexpected truncation for {text:?}");
            }
            Step::Advanced(s) => {
                state = s;
                assert!(
                    automaton.is_accepting(state),
                    "{text:?} left the automaton in a non-accepting state"
                );
            }
            Step::Rejected => panic!("{text:?} was rejected"),
        }
    }

    fn assert_rejects(automaton: &ConstraintAutomaton, text: &str) {
        assert!(
            matches!(automaton.advance(automaton.start_state(), text), Step::Rejected),
            "{text:?} was not rejected"
        );
    }

    #[test]
    fn simple_object() {
        let automaton = compile(&json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        }))
        .unwrap();

        assert_completes(&automaton, r#"{"name":"Ada"}"#);
        assert_completes(&automaton, "{ \"name\" : \"Ada Lovelace\" }");
        assert_rejects(&automaton, r#"{"age":3}"#);
        assert_rejects(&automaton, r#"{'name':'Ada'}"#);
    }

    #[test]
    fn multi_property_object_in_declaration_order() {
        let automaton = compile(&json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "integer"}
            },
            "required": ["name", "age"]
        }))
        .unwrap();

        assert_completes(&automaton, r#"{"name":"Ada","age":36}"#);
        // Properties out of declaration order are outside the emitted language.
        assert_rejects(&automaton, r#"{"age":36,"name":"Ada"}"#);
    }

    #[test]
    fn arrays_and_nesting() {
        let automaton = compile(&json!({
            "type": "object",
            "properties": {
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["tags"]
        }))
        .unwrap();

        assert_completes(&automaton, r#"{"tags":[]}"#);
        assert_completes(&automaton, r#"{"tags":["a","b","c"]}"#);
        assert_rejects(&automaton, r#"{"tags":[1,2]}"#);
    }

    #[test]
    fn enums_and_numbers() {
        let automaton = compile(&json!({
            "type": "object",
            "properties": {
                "unit": {"enum": ["celsius", "fahrenheit"]},
                "value": {"type": "number"}
            },
            "required": ["unit", "value"]
        }))
        .unwrap();

        assert_completes(&automaton, r#"{"unit":"celsius","value":-3.5e2}"#);
        assert_completes(&automaton, r#"{"unit":"fahrenheit","value":98}"#);
        assert_rejects(&automaton, r#"{"unit":"kelvin","value":1}"#);
        assert_rejects(&automaton, r#"{"unit":"celsius","value":01}"#);
    }

    #[test]
    fn string_escapes() {
        let automaton = compile(&json!({"type": "string"})).unwrap();
        assert_completes(&automaton, r#""line\nbreak""#);
        assert_completes(&automaton, r#""quote \" inside""#);
        assert_completes(&automaton, r#""é""#);
        assert_rejects(&automaton, r#""bad \x escape""#);
    }

    #[test]
    fn booleans_and_null() {
        let automaton = compile(&json!({"type": "boolean"})).unwrap();
        assert_completes(&automaton, "true");
        assert_completes(&automaton, "false");
        assert_rejects(&automaton, "maybe");

        let automaton = compile(&json!({"type": "null"})).unwrap();
        assert_completes(&automaton, "null");
    }

    #[test]
    fn rejects_unsupported_keywords() {
        for schema in [
            json!({"$ref": "#/defs/x"}),
            json!({"anyOf": [{"type": "string"}]}),
            json!({"type": "string", "pattern": "^a"}),
            json!({"type": "integer", "minimum": 0}),
            json!({"type": "object", "additionalProperties": true}),
            json!({"type": "function"}),
        ] {
            let err = compile(&schema).unwrap_err();
            assert_eq!(err.category(), "unsupported_schema", "schema: {schema}");
        }
    }

    #[test]
    fn rejects_required_without_declaration() {
        let err = compile(&json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "required": ["a", "b"]
        }))
        .unwrap_err();
        assert_eq!(err.category(), "unsupported_schema");
    }

    #[test]
    fn rejects_excessive_depth() {
        let mut schema = json!({"type": "string"});
        for _ in 0..(MAX_DEPTH + 2) {
            schema = json!({
                "type": "object",
                "properties": {"inner": schema},
                "required": ["inner"]
            });
        }
        let err = compile(&schema).unwrap_err();
        assert_eq!(err.category(), "unsupported_schema");
    }

    #[test]
    fn empty_object_schema() {
        let automaton = compile(&json!({"type": "object"})).unwrap();
        assert_completes(&automaton, "{}");
        assert_completes(&automaton, "{ }");
        assert_rejects(&automaton, r#"{"a":1}"#);
    }
}
