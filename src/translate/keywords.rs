use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use regex::Regex;
use serde_json::{json, Map, Value};

use super::{CommandKind, EditCommand};

/// Categories in the order they are tried; the first match decides.
const CATEGORIES: &[(CommandKind, &[&str])] = &[
    (
        CommandKind::ChangeColor,
        &["색상", "색깔", "color", "빨간", "파란", "초록", "노란"],
    ),
    (
        CommandKind::AddObject,
        &["추가", "만들어", "생성", "add", "create"],
    ),
    (
        CommandKind::ScaleModel,
        &["크기", "키워", "줄여", "scale", "크게", "작게"],
    ),
    (CommandKind::RotateModel, &["회전", "돌려", "rotate"]),
    (CommandKind::ApplySmooth, &["부드럽", "smooth", "스무딩"]),
    (CommandKind::Subdivide, &["세분화", "subdivide", "더 많은 면"]),
    (
        CommandKind::ChangeMaterial,
        &["금속", "메탈", "metallic", "광택"],
    ),
];

static MATCHERS: LazyLock<Vec<(CommandKind, AhoCorasick)>> = LazyLock::new(|| {
    CATEGORIES
        .iter()
        .map(|(kind, words)| {
            let automaton = AhoCorasick::new(*words).expect("valid keyword patterns");
            (*kind, automaton)
        })
        .collect()
});

/// `change_color(<name>, r, g, b)` written out in a model reply.
static COLOR_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"change_color\([^,]+,\s*([\d.]+),\s*([\d.]+),\s*([\d.]+)\)")
        .expect("valid color call pattern")
});

pub type Rgba = [f64; 4];

pub const DEFAULT_COLOR: Rgba = [0.0, 0.3, 1.0, 1.0];

const COLOR_NAMES: &[(&str, Rgba)] = &[
    ("빨간", [1.0, 0.0, 0.0, 1.0]),
    ("red", [1.0, 0.0, 0.0, 1.0]),
    ("파란", [0.0, 0.3, 1.0, 1.0]),
    ("blue", [0.0, 0.3, 1.0, 1.0]),
    ("초록", [0.0, 1.0, 0.0, 1.0]),
    ("green", [0.0, 1.0, 0.0, 1.0]),
    ("노란", [1.0, 1.0, 0.0, 1.0]),
    ("yellow", [1.0, 1.0, 0.0, 1.0]),
    ("보라", [0.5, 0.0, 1.0, 1.0]),
    ("purple", [0.5, 0.0, 1.0, 1.0]),
    ("주황", [1.0, 0.5, 0.0, 1.0]),
    ("orange", [1.0, 0.5, 0.0, 1.0]),
    ("분홍", [1.0, 0.4, 0.7, 1.0]),
    ("pink", [1.0, 0.4, 0.7, 1.0]),
    ("흰", [1.0, 1.0, 1.0, 1.0]),
    ("white", [1.0, 1.0, 1.0, 1.0]),
    ("검은", [0.0, 0.0, 0.0, 1.0]),
    ("black", [0.0, 0.0, 0.0, 1.0]),
];

const PRIMITIVES: &[(&[&str], &str)] = &[
    (&["구", "sphere"], "SPHERE"),
    (&["원기둥", "실린더", "cylinder"], "CYLINDER"),
    (&["원뿔", "cone"], "CONE"),
    (&["정육면체", "큐브", "cube"], "CUBE"),
];

const POSITIONS: &[(&[&str], [i64; 3])] = &[
    (&["위"], [0, 0, 1]),
    (&["옆", "오른쪽"], [1, 0, 0]),
    (&["왼쪽"], [-1, 0, 0]),
];

const SCALE_FACTORS: &[(&[&str], f64)] = &[
    (&["2배", "두배"], 2.0),
    (&["3배"], 3.0),
    (&["절반", "반"], 0.5),
    (&["작게", "줄여"], 0.5),
];

const ROTATION_ANGLES: &[(&str, i64)] = &[("45", 45), ("180", 180)];

fn lookup<'a, T: Copy>(text: &str, table: &'a [(&'a [&'a str], T)]) -> Option<T> {
    table
        .iter()
        .find(|(words, _)| words.iter().any(|w| text.contains(w)))
        .map(|(_, value)| *value)
}

fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Build a command from keywords in the user's message when the model reply
/// held no usable JSON.
pub fn fallback_command(message: &str, reply: &str) -> EditCommand {
    let text = message.to_lowercase();
    let kind = MATCHERS
        .iter()
        .find(|(_, automaton)| automaton.is_match(&text))
        .map(|(kind, _)| *kind)
        .unwrap_or(CommandKind::GenericEdit);

    match kind {
        CommandKind::ChangeColor => {
            let [r, g, b, a] = color_from(reply, &text);
            EditCommand::new(
                kind,
                params(json!({"r": r, "g": g, "b": b, "a": a})),
                "Changed the color",
            )
        }
        CommandKind::AddObject => {
            let primitive = lookup(&text, PRIMITIVES).unwrap_or("CUBE");
            let position = lookup(&text, POSITIONS).unwrap_or([0, 0, -1]);
            EditCommand::new(
                kind,
                params(json!({"type": primitive, "position": position, "scale": 1.0})),
                format!("Added a {}", primitive.to_lowercase()),
            )
        }
        CommandKind::ScaleModel => {
            let factor = lookup(&text, SCALE_FACTORS).unwrap_or(2.0);
            EditCommand::new(
                kind,
                params(json!({"factor": factor})),
                format!("Scaled by {factor}x"),
            )
        }
        CommandKind::RotateModel => {
            let angle = ROTATION_ANGLES
                .iter()
                .find(|(word, _)| text.contains(word))
                .map(|(_, angle)| *angle)
                .unwrap_or(90);
            EditCommand::new(
                kind,
                params(json!({"axis": "Z", "angle": angle})),
                format!("Rotated {angle} degrees around Z"),
            )
        }
        CommandKind::ApplySmooth => EditCommand::new(kind, Map::new(), "Applied smoothing"),
        CommandKind::Subdivide => EditCommand::new(
            kind,
            params(json!({"levels": 2})),
            "Subdivided the model",
        ),
        CommandKind::ChangeMaterial => EditCommand::new(
            kind,
            params(json!({"metallic": 0.9, "roughness": 0.1})),
            "Switched to a metallic material",
        ),
        _ => EditCommand::new(
            CommandKind::GenericEdit,
            params(json!({"message": message})),
            "Processed the request",
        ),
    }
}

/// Color from an explicit `change_color(...)` in the reply, else from a color
/// name in the (lower-cased) message, else the default blue.
pub fn color_from(reply: &str, message: &str) -> Rgba {
    if let Some(caps) = COLOR_CALL.captures(reply) {
        let channels: Option<Vec<f64>> = (1..=3)
            .map(|i| caps.get(i).and_then(|m| m.as_str().parse().ok()))
            .collect();
        if let Some(c) = channels {
            return [c[0], c[1], c[2], 1.0];
        }
    }

    COLOR_NAMES
        .iter()
        .find(|(name, _)| message.contains(name))
        .map(|(_, rgba)| *rgba)
        .unwrap_or(DEFAULT_COLOR)
}
