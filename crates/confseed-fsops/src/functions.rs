//! Template function library.
//!
//! Every function is registered twice on the same environment: as a global function and as a
//! filter taking its subject as the first argument, so `sha256sum(x)` and `x | sha256sum` agree.
//! Conditions, file contents and command lines all render through the same registration.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use minijinja::value::{Rest, Value, ValueKind};
use minijinja::{Environment, Error, ErrorKind, State};
use rand::Rng;
use regex::Regex;
use sha1::Sha1;
use sha2::{Digest, Sha256};

macro_rules! register {
    ($env:expr; $($name:literal => $func:path),* $(,)?) => {
        $(
            $env.add_function($name, $func);
            $env.add_filter($name, $func);
        )*
    };
}

/// Register the whole library on `env`.
pub(crate) fn register_functions(env: &mut Environment<'_>) {
    register!(env;
        "env" => env_var,
        "expandenv" => expand_env,
        "base" => path_base,
        "dir" => path_dir,
        "clean" => path_clean,
        "ext" => path_ext,
        "is_abs" => path_is_abs,
        "now" => now,
        "date" => date,
        "date_convert" => date_convert,
        "epoch" => epoch,
        "until" => until,
        "fail" => fail,
        "ternary" => ternary,
        "random" => random,
        "random_string" => random_string,
        "uuid" => uuid_v4,
        "sha1sum" => sha1sum,
        "sha256sum" => sha256sum,
        "b64enc" => b64enc,
        "b64dec" => b64dec,
        "trim" => trim,
        "upper" => upper,
        "lower" => lower,
        "title" => title,
        "trim_chars" => trim_chars,
        "trim_prefix" => trim_prefix,
        "trim_suffix" => trim_suffix,
        "contains" => contains,
        "has_prefix" => has_prefix,
        "has_suffix" => has_suffix,
        "indent" => indent,
        "quote" => quote,
        "squote" => squote,
        "replace" => replace,
        "to_string" => to_string,
        "to_bool" => to_bool,
        "to_int" => to_int,
        "to_float" => to_float,
        "add" => add,
        "sub" => sub,
        "mul" => mul,
        "div" => div,
        "mod" => modulo,
        "max" => max,
        "min" => min,
        "ceil" => ceil,
        "floor" => floor,
        "round" => round,
        "regex_match" => regex_match,
        "regex_find_all" => regex_find_all,
        "regex_replace_all" => regex_replace_all,
        "regex_split" => regex_split,
        "split" => split,
        "join" => join,
        "sort" => sort,
        "list" => list,
        "first" => first,
        "last" => last,
        "reverse" => reverse,
        "uniq" => uniq,
        "has" => has,
        "concat" => concat,
        "append" => append,
        "to_json" => to_json,
        "to_yaml" => to_yaml,
        "dict" => dict,
        "get" => get,
        "set" => set,
        "unset" => unset,
        "has_key" => has_key,
        "keys" => keys,
        "values" => values,
    );
}

fn invalid(detail: impl Into<Cow<'static, str>>) -> Error {
    Error::new(ErrorKind::InvalidOperation, detail)
}

fn bad_args(detail: impl Into<Cow<'static, str>>) -> Error {
    let detail: Cow<'static, str> = detail.into();
    Error::new(ErrorKind::InvalidOperation, format!("invalid argument: {detail}"))
}

fn text(value: &Value) -> String {
    match value.kind() {
        ValueKind::Bool => value.is_true().to_string(),
        _ => value
            .as_str()
            .map_or_else(|| value.to_string(), str::to_string),
    }
}

fn seq(value: &Value) -> Result<Vec<Value>, Error> {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => Ok(Vec::new()),
        ValueKind::Seq | ValueKind::Iterable => Ok(value.try_iter()?.collect()),
        _ => Err(bad_args(format!("expected a list, got {:?}", value.kind()))),
    }
}

fn map(value: &Value) -> Result<BTreeMap<String, Value>, Error> {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => Ok(BTreeMap::new()),
        ValueKind::Map => {
            let mut out = BTreeMap::new();
            for key in value.try_iter()? {
                let item = value.get_item(&key)?;
                out.insert(text(&key), item);
            }
            Ok(out)
        }
        _ => Err(bad_args(format!("expected a dict, got {:?}", value.kind()))),
    }
}

fn map_value(map: &BTreeMap<String, Value>) -> Value {
    Value::from_serialize(map)
}

fn compile(pattern: &str) -> Result<Regex, Error> {
    Regex::new(pattern)
        .map_err(|err| bad_args(format!("invalid regex '{pattern}'")).with_source(err))
}

// environment

fn lookup_env(state: &State, key: &str) -> Option<String> {
    let env = state.lookup("environment")?;
    let value = env.get_attr(key).ok()?;
    value.as_str().map(str::to_string)
}

fn env_var(state: &State, key: String) -> String {
    lookup_env(state, &key).unwrap_or_default()
}

fn expand_env(state: &State, input: String) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut index = 0;
    while index < chars.len() {
        if chars[index] != '$' {
            out.push(chars[index]);
            index += 1;
            continue;
        }
        let (name, next) = if chars.get(index + 1) == Some(&'{') {
            match chars[index + 2..].iter().position(|ch| *ch == '}') {
                Some(end) => (
                    chars[index + 2..index + 2 + end].iter().collect::<String>(),
                    index + 3 + end,
                ),
                None => (String::new(), index + 1),
            }
        } else {
            let len = chars[index + 1..]
                .iter()
                .take_while(|ch| ch.is_ascii_alphanumeric() || **ch == '_')
                .count();
            (
                chars[index + 1..index + 1 + len].iter().collect::<String>(),
                index + 1 + len,
            )
        };
        if name.is_empty() {
            out.push('$');
            index += 1;
        } else {
            out.push_str(&lookup_env(state, &name).unwrap_or_default());
            index = next;
        }
    }
    out
}

// paths (slash separated, lexical)

fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

fn path_clean(path: String) -> String {
    clean_path(&path)
}

fn path_base(path: String) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    trimmed
        .rsplit('/')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

fn path_dir(path: String) -> String {
    match path.rfind('/') {
        Some(index) => clean_path(&path[..=index]),
        None => ".".to_string(),
    }
}

fn path_ext(path: String) -> String {
    for (index, ch) in path.char_indices().rev() {
        match ch {
            '/' => break,
            '.' => return path[index..].to_string(),
            _ => {}
        }
    }
    String::new()
}

fn path_is_abs(path: String) -> bool {
    path.starts_with('/')
}

// dates

fn resolve_time(time: Option<&Value>) -> Result<DateTime<Local>, Error> {
    let Some(value) = time.filter(|value| !value.is_undefined() && !value.is_none()) else {
        return Ok(Local::now());
    };
    if let Some(raw) = value.as_str() {
        return DateTime::parse_from_rfc3339(raw)
            .map(|parsed| parsed.with_timezone(&Local))
            .map_err(|err| bad_args(format!("invalid timestamp '{raw}'")).with_source(err));
    }
    let seconds = i64::try_from(value.clone())?;
    Local
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| bad_args(format!("timestamp {seconds} out of range")))
}

fn now() -> String {
    Local::now().to_rfc3339()
}

fn date(format: String, time: Option<Value>) -> Result<String, Error> {
    let moment = resolve_time(time.as_ref())?;
    let mut out = String::new();
    write!(out, "{}", moment.format(&format))
        .map_err(|_| bad_args(format!("invalid date format '{format}'")))?;
    Ok(out)
}

fn date_convert(value: String, layout: String) -> Result<String, Error> {
    let naive = NaiveDateTime::parse_from_str(&value, &layout)
        .or_else(|_| {
            NaiveDate::parse_from_str(&value, &layout)
                .map(|day| day.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .map_err(|err| bad_args(format!("cannot parse '{value}' with '{layout}'")).with_source(err))?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|moment| moment.to_rfc3339())
        .ok_or_else(|| invalid(format!("ambiguous local time '{value}'")))
}

fn epoch(time: Option<Value>) -> Result<i64, Error> {
    Ok(resolve_time(time.as_ref())?.timestamp())
}

// flow

fn until(start: i64, stop: i64, step: Option<i64>) -> Vec<i64> {
    let step = step.unwrap_or(if stop < start { -1 } else { 1 });
    let mut out = Vec::new();
    let mut current = start;
    if step > 0 {
        while current < stop {
            out.push(current);
            current += step;
        }
    } else if step < 0 {
        while current > stop {
            out.push(current);
            current += step;
        }
    }
    out
}

fn fail(message: String) -> Result<String, Error> {
    Err(invalid(message))
}

fn ternary(condition: Value, if_true: Value, if_false: Value) -> Value {
    if condition.is_true() { if_true } else { if_false }
}

// random and crypto

fn random(letters: String, length: usize) -> Result<String, Error> {
    let alphabet: Vec<char> = letters.chars().collect();
    if alphabet.is_empty() {
        return Err(bad_args("random needs a non-empty alphabet"));
    }
    let mut rng = rand::rng();
    Ok((0..length)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())])
        .collect())
}

fn random_string(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    rand::rng().fill(&mut bytes[..]);
    URL_SAFE.encode(bytes)
}

fn uuid_v4() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn sha1sum(input: String) -> String {
    format!("{:x}", Sha1::digest(input.as_bytes()))
}

fn sha256sum(input: String) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

fn b64enc(input: String) -> String {
    STANDARD.encode(input.as_bytes())
}

fn b64dec(input: String) -> Result<String, Error> {
    let bytes = STANDARD
        .decode(input.trim())
        .map_err(|err| bad_args("invalid base64 input").with_source(err))?;
    String::from_utf8(bytes).map_err(|err| invalid("decoded base64 is not UTF-8").with_source(err))
}

// strings

fn trim(input: String) -> String {
    input.trim().to_string()
}

fn upper(input: String) -> String {
    input.to_uppercase()
}

fn lower(input: String) -> String {
    input.to_lowercase()
}

fn title(input: String) -> String {
    let mut out = String::with_capacity(input.len());
    let mut at_word_start = true;
    for ch in input.chars() {
        if at_word_start {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = ch.is_whitespace();
    }
    out
}

fn trim_chars(input: String, cutset: String) -> String {
    input.trim_matches(|ch| cutset.contains(ch)).to_string()
}

fn trim_prefix(input: String, prefix: String) -> String {
    input.strip_prefix(prefix.as_str()).unwrap_or(&input).to_string()
}

fn trim_suffix(input: String, suffix: String) -> String {
    input.strip_suffix(suffix.as_str()).unwrap_or(&input).to_string()
}

fn contains(input: String, needle: String) -> bool {
    input.contains(&needle)
}

fn has_prefix(input: String, prefix: String) -> bool {
    input.starts_with(&prefix)
}

fn has_suffix(input: String, suffix: String) -> bool {
    input.ends_with(&suffix)
}

fn indent(input: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    format!("{pad}{}", input.replace('\n', &format!("\n{pad}")))
}

fn quote(items: Rest<Value>) -> String {
    items
        .iter()
        .filter(|item| !item.is_none() && !item.is_undefined())
        .map(|item| format!("{:?}", text(item)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn squote(items: Rest<Value>) -> String {
    items
        .iter()
        .filter(|item| !item.is_none() && !item.is_undefined())
        .map(|item| format!("'{}'", text(item)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn replace(input: String, from: String, to: String) -> String {
    input.replace(&from, &to)
}

fn to_string(value: Value) -> String {
    text(&value)
}

fn to_bool(value: Value) -> Result<bool, Error> {
    match value.kind() {
        ValueKind::String => match value.as_str().unwrap_or_default().trim() {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
            other => Err(bad_args(format!("cannot convert '{other}' to bool"))),
        },
        ValueKind::Number => Ok(number(&value)?.as_f64() != 0.0),
        _ => Ok(value.is_true()),
    }
}

fn to_int(value: Value) -> Result<i64, Error> {
    Ok(number(&value)?.as_i64())
}

fn to_float(value: Value) -> Result<f64, Error> {
    Ok(number(&value)?.as_f64())
}

// math

#[derive(Clone, Copy, Debug)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn as_i64(self) -> i64 {
        match self {
            Self::Int(value) => value,
            Self::Float(value) => value as i64,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Int(value) => Value::from(value),
            Self::Float(value) => Value::from(value),
        }
    }
}

fn number(value: &Value) -> Result<Number, Error> {
    let json = serde_json::to_value(value)
        .map_err(|err| invalid("value is not serializable").with_source(err))?;
    match json {
        serde_json::Value::Number(num) => num
            .as_i64()
            .map(Number::Int)
            .or_else(|| num.as_f64().map(Number::Float))
            .ok_or_else(|| bad_args(format!("number {num} out of range"))),
        serde_json::Value::String(raw) => {
            let raw = raw.trim();
            raw.parse::<i64>()
                .map(Number::Int)
                .or_else(|_| raw.parse::<f64>().map(Number::Float))
                .map_err(|_| bad_args(format!("cannot convert '{raw}' to a number")))
        }
        serde_json::Value::Bool(flag) => Ok(Number::Int(i64::from(flag))),
        serde_json::Value::Null => Ok(Number::Int(0)),
        other => Err(bad_args(format!("cannot convert {other} to a number"))),
    }
}

fn arithmetic(
    left: &Value,
    right: &Value,
    name: &'static str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, Error> {
    match (number(left)?, number(right)?) {
        (Number::Int(a), Number::Int(b)) => int_op(a, b)
            .map(Value::from)
            .ok_or_else(|| invalid(format!("{name}: integer overflow or division by zero"))),
        (a, b) => Ok(Value::from(float_op(a.as_f64(), b.as_f64()))),
    }
}

fn add(left: Value, right: Value) -> Result<Value, Error> {
    arithmetic(&left, &right, "add", i64::checked_add, |a, b| a + b)
}

fn sub(left: Value, right: Value) -> Result<Value, Error> {
    arithmetic(&left, &right, "sub", i64::checked_sub, |a, b| a - b)
}

fn mul(left: Value, right: Value) -> Result<Value, Error> {
    arithmetic(&left, &right, "mul", i64::checked_mul, |a, b| a * b)
}

fn div(left: Value, right: Value) -> Result<Value, Error> {
    if number(&right)?.as_f64() == 0.0 {
        return Err(invalid("div: division by zero"));
    }
    arithmetic(&left, &right, "div", i64::checked_div, |a, b| a / b)
}

fn modulo(left: Value, right: Value) -> Result<Value, Error> {
    if number(&right)?.as_f64() == 0.0 {
        return Err(invalid("mod: division by zero"));
    }
    arithmetic(&left, &right, "mod", i64::checked_rem, |a, b| a % b)
}

fn extreme(first: &Value, rest: &[Value], pick: Ordering) -> Result<Value, Error> {
    let mut best = number(first)?;
    for item in rest {
        let candidate = number(item)?;
        if candidate.as_f64().partial_cmp(&best.as_f64()) == Some(pick) {
            best = candidate;
        }
    }
    Ok(best.into_value())
}

fn max(first: Value, rest: Rest<Value>) -> Result<Value, Error> {
    extreme(&first, &rest, Ordering::Greater)
}

fn min(first: Value, rest: Rest<Value>) -> Result<Value, Error> {
    extreme(&first, &rest, Ordering::Less)
}

fn ceil(value: Value) -> Result<f64, Error> {
    Ok(number(&value)?.as_f64().ceil())
}

fn floor(value: Value) -> Result<f64, Error> {
    Ok(number(&value)?.as_f64().floor())
}

fn round(value: Value, places: Option<i32>) -> Result<f64, Error> {
    let pow = 10f64.powi(places.unwrap_or(0));
    Ok((number(&value)?.as_f64() * pow).round() / pow)
}

// regex

fn regex_match(input: String, pattern: String) -> Result<bool, Error> {
    Ok(compile(&pattern)?.is_match(&input))
}

fn regex_find_all(input: String, pattern: String, limit: Option<i64>) -> Result<Vec<String>, Error> {
    let regex = compile(&pattern)?;
    let found = regex.find_iter(&input).map(|found| found.as_str().to_string());
    Ok(match limit.and_then(|limit| usize::try_from(limit).ok()) {
        Some(limit) => found.take(limit).collect(),
        None => found.collect(),
    })
}

fn regex_replace_all(input: String, pattern: String, replacement: String) -> Result<String, Error> {
    Ok(compile(&pattern)?
        .replace_all(&input, replacement.as_str())
        .into_owned())
}

fn regex_split(input: String, pattern: String, limit: Option<i64>) -> Result<Vec<String>, Error> {
    let regex = compile(&pattern)?;
    Ok(match limit.and_then(|limit| usize::try_from(limit).ok()) {
        Some(limit) => regex.splitn(&input, limit).map(str::to_string).collect(),
        None => regex.split(&input).map(str::to_string).collect(),
    })
}

// lists

fn split(input: String, separator: String) -> Vec<String> {
    input.split(separator.as_str()).map(str::to_string).collect()
}

fn join(items: Value, separator: Option<String>) -> Result<String, Error> {
    Ok(seq(&items)?
        .iter()
        .map(text)
        .collect::<Vec<_>>()
        .join(separator.as_deref().unwrap_or("")))
}

fn sort(items: Value) -> Result<Vec<Value>, Error> {
    let mut items = seq(&items)?;
    items.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    Ok(items)
}

fn list(items: Rest<Value>) -> Vec<Value> {
    items.0
}

fn first(items: Value) -> Result<Value, Error> {
    Ok(seq(&items)?.into_iter().next().unwrap_or_else(|| Value::from(())))
}

fn last(items: Value) -> Result<Value, Error> {
    Ok(seq(&items)?.pop().unwrap_or_else(|| Value::from(())))
}

fn reverse(items: Value) -> Result<Vec<Value>, Error> {
    let mut items = seq(&items)?;
    items.reverse();
    Ok(items)
}

fn uniq(items: Value) -> Result<Vec<Value>, Error> {
    let mut out: Vec<Value> = Vec::new();
    for item in seq(&items)? {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    Ok(out)
}

fn has(items: Value, needle: Value) -> Result<bool, Error> {
    Ok(seq(&items)?.contains(&needle))
}

fn concat(lists: Rest<Value>) -> Result<Vec<Value>, Error> {
    let mut out = Vec::new();
    for items in lists.iter() {
        out.extend(seq(items)?);
    }
    Ok(out)
}

fn append(items: Value, item: Value) -> Result<Vec<Value>, Error> {
    let mut items = seq(&items)?;
    items.push(item);
    Ok(items)
}

// serialization

fn to_json(value: Value) -> Result<String, Error> {
    serde_json::to_string_pretty(&value)
        .map_err(|err| invalid("cannot encode value as JSON").with_source(err))
}

fn to_yaml(value: Value) -> Result<String, Error> {
    serde_yaml::to_string(&value)
        .map(|encoded| encoded.trim().to_string())
        .map_err(|err| invalid("cannot encode value as YAML").with_source(err))
}

// dicts

fn dict(pairs: Rest<Value>) -> Value {
    let mut out = BTreeMap::new();
    for pair in pairs.chunks(2) {
        let value = pair.get(1).cloned().unwrap_or_else(|| Value::from(""));
        out.insert(text(&pair[0]), value);
    }
    map_value(&out)
}

fn get(dict: Value, key: String) -> Result<Value, Error> {
    Ok(map(&dict)?.remove(&key).unwrap_or_else(|| Value::from("")))
}

fn set(dict: Value, key: String, value: Value) -> Result<Value, Error> {
    let mut entries = map(&dict)?;
    entries.insert(key, value);
    Ok(map_value(&entries))
}

fn unset(dict: Value, key: String) -> Result<Value, Error> {
    let mut entries = map(&dict)?;
    entries.remove(&key);
    Ok(map_value(&entries))
}

fn has_key(dict: Value, key: String) -> Result<bool, Error> {
    Ok(map(&dict)?.contains_key(&key))
}

fn keys(dict: Value) -> Result<Vec<String>, Error> {
    Ok(map(&dict)?.into_keys().collect())
}

fn values(dict: Value) -> Result<Vec<Value>, Error> {
    Ok(map(&dict)?.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templator::TemplateEngine;
    use serde_json::json;
    use std::error::Error as StdError;

    type TestResult<T> = Result<T, Box<dyn StdError>>;

    fn render(source: &str, ctx: &serde_json::Value) -> TestResult<String> {
        Ok(TemplateEngine::new().render_str("test", source, ctx)?)
    }

    #[test]
    fn functions_and_filters_share_one_namespace() -> TestResult<()> {
        let ctx = json!({});
        assert_eq!(render("{{ upper('abc') }}", &ctx)?, "ABC");
        assert_eq!(render("{{ 'abc' | upper }}", &ctx)?, "ABC");
        assert_eq!(
            render("{{ sha256sum('abc') }}", &ctx)?,
            render("{{ 'abc' | sha256sum }}", &ctx)?
        );
        Ok(())
    }

    #[test]
    fn env_functions_read_context_environment() -> TestResult<()> {
        let ctx = json!({"environment": {"HOME": "/home/app", "USER": "app"}});
        assert_eq!(render("{{ env('HOME') }}", &ctx)?, "/home/app");
        assert_eq!(render("{{ env('MISSING') }}", &ctx)?, "");
        assert_eq!(
            render("{{ expandenv('$USER at ${HOME} costs $5$') }}", &ctx)?,
            "app at /home/app costs $"
        );
        Ok(())
    }

    #[test]
    fn path_helpers_follow_slash_semantics() -> TestResult<()> {
        let ctx = json!({});
        assert_eq!(render("{{ base('/etc/app/conf.yml') }}", &ctx)?, "conf.yml");
        assert_eq!(render("{{ dir('/etc/app/conf.yml') }}", &ctx)?, "/etc/app");
        assert_eq!(render("{{ dir('file') }}", &ctx)?, ".");
        assert_eq!(render("{{ clean('a//b/../c/.') }}", &ctx)?, "a/c");
        assert_eq!(render("{{ ext('conf.yml.tpl') }}", &ctx)?, ".tpl");
        assert_eq!(render("{{ is_abs('/x') }}", &ctx)?, "true");
        Ok(())
    }

    #[test]
    fn string_helpers() -> TestResult<()> {
        let ctx = json!({});
        assert_eq!(render("{{ title('hello big world') }}", &ctx)?, "Hello Big World");
        assert_eq!(render("{{ trim_chars('--x--', '-') }}", &ctx)?, "x");
        assert_eq!(render("{{ 'app.tpl' | trim_suffix('.tpl') }}", &ctx)?, "app");
        assert_eq!(render("{{ indent('a\nb', 2) }}", &ctx)?, "  a\n  b");
        assert_eq!(render("{{ quote('a', 'b') }}", &ctx)?, "\"a\" \"b\"");
        assert_eq!(render("{{ squote('a') }}", &ctx)?, "'a'");
        assert_eq!(render("{{ to_bool('True') }}", &ctx)?, "true");
        assert!(render("{{ to_bool('maybe') }}", &ctx).is_err());
        assert_eq!(render("{{ b64dec(b64enc('secret')) }}", &ctx)?, "secret");
        Ok(())
    }

    #[test]
    fn math_keeps_integers_and_rejects_zero_division() -> TestResult<()> {
        let ctx = json!({});
        assert_eq!(render("{{ add(2, 3) }}", &ctx)?, "5");
        assert_eq!(render("{{ mul('4', 2) }}", &ctx)?, "8");
        assert_eq!(render("{{ div(7, 2) }}", &ctx)?, "3");
        assert_eq!(render("{{ max(3, 9, 4) }}", &ctx)?, "9");
        assert_eq!(render("{{ min(3, 9, 4) }}", &ctx)?, "3");
        assert_eq!(render("{{ round(2.346, 2) }}", &ctx)?, "2.35");
        assert!(render("{{ div(1, 0) }}", &ctx).is_err());
        assert!(render("{{ mod(1, 0) }}", &ctx).is_err());
        Ok(())
    }

    #[test]
    fn list_and_dict_helpers() -> TestResult<()> {
        let ctx = json!({"items": ["b", "a", "b"], "cfg": {"x": 1}});
        assert_eq!(render("{{ items | uniq | sort | join(',') }}", &ctx)?, "a,b");
        assert_eq!(render("{{ first(items) }}{{ last(items) }}", &ctx)?, "bb");
        assert_eq!(render("{{ has(items, 'a') }}", &ctx)?, "true");
        assert_eq!(render("{{ concat(items, ['c']) | length }}", &ctx)?, "4");
        assert_eq!(render("{{ keys(set(cfg, 'y', 2)) | join(',') }}", &ctx)?, "x,y");
        assert_eq!(render("{{ has_key(unset(cfg, 'x'), 'x') }}", &ctx)?, "false");
        assert_eq!(render("{{ get(dict('k', 'v'), 'k') }}", &ctx)?, "v");
        assert_eq!(render("{{ until(0, 3) | join('') }}", &ctx)?, "012");
        Ok(())
    }

    #[test]
    fn regex_and_serialization_helpers() -> TestResult<()> {
        let ctx = json!({"cfg": {"a": [1, 2]}});
        assert_eq!(render("{{ regex_match('abc123', '^[a-z]+[0-9]+$') }}", &ctx)?, "true");
        assert_eq!(
            render("{{ regex_replace_all('a1b2', '[0-9]', '#') }}", &ctx)?,
            "a#b#"
        );
        assert_eq!(render("{{ regex_split('a1b2c', '[0-9]', -1) | join(' ') }}", &ctx)?, "a b c");
        assert_eq!(render("{{ to_json(cfg.a) }}", &ctx)?, "[\n  1,\n  2\n]");
        assert_eq!(render("{{ to_yaml(cfg) }}", &ctx)?, "a:\n- 1\n- 2");
        assert!(render("{{ regex_match('a', '(') }}", &ctx).is_err());
        Ok(())
    }

    #[test]
    fn bad_arguments_report_invalid_operation() -> TestResult<()> {
        let engine = TemplateEngine::new();
        let ctx = json!({});
        for source in [
            "{{ regex_match('a', '(') }}",
            "{{ to_bool('maybe') }}",
            "{{ b64dec('***') }}",
            "{{ keys(3) }}",
        ] {
            let err = engine
                .render_str("test", source, &ctx)
                .err()
                .ok_or_else(|| format!("{source} should fail"))?;
            assert_eq!(err.kind(), ErrorKind::InvalidOperation, "{source}");
            assert!(err.to_string().contains("invalid argument"), "{source}: {err}");
        }
        Ok(())
    }

    #[test]
    fn booleans_render_lowercase_everywhere() -> TestResult<()> {
        let ctx = json!({"data": {"enabled": true, "debug": false}});
        assert_eq!(
            render("{\"enabled\": {{ data.enabled }}, \"debug\": {{ data.debug }}}", &ctx)?,
            "{\"enabled\": true, \"debug\": false}"
        );
        assert_eq!(render("--verbose={{ 1 > 2 }}", &ctx)?, "--verbose=false");
        assert_eq!(render("{{ to_string(data.enabled) | upper }}", &ctx)?, "TRUE");
        Ok(())
    }

    #[test]
    fn dates_and_failures() -> TestResult<()> {
        let ctx = json!({});
        assert_eq!(render("{{ date('%Y', 0) | length }}", &ctx)?, "4");
        assert_eq!(render("{{ epoch('1970-01-01T00:01:00+00:00') }}", &ctx)?, "60");
        assert!(render("{{ fail('stop here') }}", &ctx).is_err());
        assert_eq!(render("{{ ternary(true, 'yes', 'no') }}", &ctx)?, "yes");
        assert_eq!(render("{{ random('x', 3) }}", &ctx)?, "xxx");
        assert_eq!(render("{{ uuid() | length }}", &ctx)?, "36");
        Ok(())
    }
}
