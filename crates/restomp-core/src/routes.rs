//! Path pattern compiler and route table.
//!
//! A route template addresses server resources with named segments:
//!
//! - `/users/:id` — `:id` captures exactly one segment,
//! - `/users/:id?` — optional, may be absent from the matched path,
//! - `/files/:path*` — wildcard, captures one or more segments.
//!
//! Compiling yields a [`PathPattern`]: an anchored, case-insensitive
//! matcher over whole paths plus the ordered list of parameter keys.
//! Matching a path produces one capture per declared parameter, in
//! declaration order; reading an absent optional capture yields `None`,
//! never an error.
//!
//! No regex dependency: the matcher is a compiled segment list with
//! backtracking for optional and wildcard segments.

use std::sync::Arc;

use restomp_api::{Message, Method};

use crate::error::CoreError;

// ── ParamKey ─────────────────────────────────────────────────────────

/// A declared parameter of a route template, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamKey {
    pub name: String,
    pub optional: bool,
}

// ── Compiled segments ────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Segment {
    /// Literal segment, lowercased at compile time.
    Literal(String),
    /// Required named parameter capturing one segment.
    Param { key: usize },
    /// Optional named parameter; the whole segment may be absent.
    OptionalParam { key: usize },
    /// Greedy wildcard capturing one or more segments.
    Wildcard { key: usize },
}

// ── PathPattern ──────────────────────────────────────────────────────

/// A compiled route template. Immutable once compiled.
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    segments: Vec<Segment>,
    keys: Vec<ParamKey>,
}

impl PathPattern {
    /// Compile a route template.
    ///
    /// Fails only on malformed templates; this is a configuration-time
    /// error, not a runtime one.
    pub fn compile(template: &str) -> Result<Self, CoreError> {
        let mut segments = Vec::new();
        let mut keys = Vec::new();

        for part in split_path(template) {
            let Some(spec) = part.strip_prefix(':') else {
                segments.push(Segment::Literal(part.to_lowercase()));
                continue;
            };

            let (name, modifier) = match spec.strip_suffix(['?', '*']) {
                Some(name) => (name, spec.chars().next_back()),
                None => (spec, None),
            };

            if name.is_empty() {
                return Err(malformed(template, "empty parameter name"));
            }
            if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                return Err(malformed(
                    template,
                    &format!("invalid parameter name {name:?}"),
                ));
            }

            let key = keys.len();
            keys.push(ParamKey {
                name: name.to_owned(),
                optional: modifier == Some('?'),
            });
            segments.push(match modifier {
                Some('?') => Segment::OptionalParam { key },
                Some('*') => Segment::Wildcard { key },
                _ => Segment::Param { key },
            });
        }

        Ok(Self {
            template: template.to_owned(),
            segments,
            keys,
        })
    }

    /// The original template this pattern was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Declared parameters, in declaration order.
    pub fn keys(&self) -> &[ParamKey] {
        &self.keys
    }

    /// Match a concrete path against the pattern.
    ///
    /// Matching is case-insensitive and anchored over the full path.
    /// Captured values keep their original case.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let parts: Vec<&str> = split_path(path).collect();
        let mut values = vec![None; self.keys.len()];
        if self.match_from(0, &parts, &mut values) {
            Some(PathParams {
                entries: self
                    .keys
                    .iter()
                    .cloned()
                    .zip(values)
                    .collect(),
            })
        } else {
            None
        }
    }

    fn match_from(&self, seg: usize, parts: &[&str], values: &mut Vec<Option<String>>) -> bool {
        let Some(segment) = self.segments.get(seg) else {
            return parts.is_empty();
        };

        match segment {
            Segment::Literal(lit) => parts
                .split_first()
                .is_some_and(|(head, rest)| {
                    head.eq_ignore_ascii_case(lit) && self.match_from(seg + 1, rest, values)
                }),
            Segment::Param { key } => {
                let Some((head, rest)) = parts.split_first() else {
                    return false;
                };
                values[*key] = Some((*head).to_owned());
                if self.match_from(seg + 1, rest, values) {
                    return true;
                }
                values[*key] = None;
                false
            }
            Segment::OptionalParam { key } => {
                if let Some((head, rest)) = parts.split_first() {
                    values[*key] = Some((*head).to_owned());
                    if self.match_from(seg + 1, rest, values) {
                        return true;
                    }
                    values[*key] = None;
                }
                self.match_from(seg + 1, parts, values)
            }
            Segment::Wildcard { key } => {
                // Non-greedy: take the fewest segments that let the rest match.
                for take in 1..=parts.len() {
                    values[*key] = Some(parts[..take].join("/"));
                    if self.match_from(seg + 1, &parts[take..], values) {
                        return true;
                    }
                }
                values[*key] = None;
                false
            }
        }
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty())
}

fn malformed(template: &str, reason: &str) -> CoreError {
    CoreError::MalformedTemplate {
        template: template.to_owned(),
        reason: reason.to_owned(),
    }
}

// ── PathParams ───────────────────────────────────────────────────────

/// Parameter values extracted by a successful match.
///
/// One entry per declared parameter, in declaration order. Absent
/// optional parameters resolve to "no value"; so does any unknown name.
#[derive(Debug, Clone, Default)]
pub struct PathParams {
    entries: Vec<(ParamKey, Option<String>)>,
}

impl PathParams {
    /// The value captured for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.name == name)
            .and_then(|(_, value)| value.as_deref())
    }

    /// Number of declared parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.name.as_str(), value.as_deref()))
    }
}

// ── RouteTable ───────────────────────────────────────────────────────

/// Handler invoked when an inbound message matches a route.
pub type RouteHandler = Arc<dyn Fn(&PathParams, &Message) + Send + Sync>;

struct Route {
    pattern: PathPattern,
    handlers: Vec<(Method, RouteHandler)>,
}

/// Caller-configured routes: template plus per-method handlers.
///
/// Owned by the client for its lifetime; inbound messages whose
/// destination matches a compiled pattern are dispatched to every handler
/// registered for the message's method, with the extracted parameters.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `method` on `template`.
    ///
    /// Compiling happens here, so malformed templates fail at
    /// configuration time.
    pub fn route<F>(mut self, template: &str, method: Method, handler: F) -> Result<Self, CoreError>
    where
        F: Fn(&PathParams, &Message) + Send + Sync + 'static,
    {
        let handler: RouteHandler = Arc::new(handler);
        if let Some(route) = self
            .routes
            .iter_mut()
            .find(|r| r.pattern.template() == template)
        {
            route.handlers.push((method, handler));
        } else {
            self.routes.push(Route {
                pattern: PathPattern::compile(template)?,
                handlers: vec![(method, handler)],
            });
        }
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Dispatch an inbound message to matching route handlers.
    ///
    /// Messages without a recognized method never reach route handlers;
    /// they still flow into model reconciliation.
    pub(crate) fn dispatch(&self, message: &Message) {
        let Some(method) = message.method() else {
            return;
        };
        for route in &self.routes {
            let Some(params) = route.pattern.matches(&message.destination) else {
                continue;
            };
            for (handler_method, handler) in &route.handlers {
                if *handler_method == method {
                    handler(&params, message);
                }
            }
        }
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes.len())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
