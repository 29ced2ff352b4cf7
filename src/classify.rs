//! Infrastructure-call classification.
//!
//! A call leaves the in-process world when its receiver field's declared
//! type (or an annotation on the field / the type's class) matches a rule
//! in the classification table. The table is ordered: first match wins.
//! `.depslice.json` can prepend its own rules and disable the built-ins.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────
// Categories & rules
// ─────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallCategory {
    Rpc,
    Persistence,
    Queue,
    Cache,
    Template,
    Log,
}

/// How a rule's pattern is compared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Pattern equals an annotation name (qualified or simple).
    Annotation,
    /// Pattern equals the declared type (qualified or simple).
    TypeName,
    /// Pattern is a package/type prefix of the declared type.
    TypePrefix,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassifyRule {
    pub pattern: String,
    #[serde(rename = "match")]
    pub match_kind: MatchKind,
    pub category: CallCategory,
}

impl ClassifyRule {
    fn new(pattern: &str, match_kind: MatchKind, category: CallCategory) -> Self {
        Self { pattern: pattern.into(), match_kind, category }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Classifier
// ─────────────────────────────────────────────────────────────────────────

pub struct Classifier {
    rules: Vec<ClassifyRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self { rules: builtin_rules() }
    }
}

impl Classifier {
    /// Extra rules are checked before the built-in table; pass
    /// `use_builtin = false` to replace the table outright.
    pub fn with_rules(extra: Vec<ClassifyRule>, use_builtin: bool) -> Self {
        let mut rules = extra;
        if use_builtin {
            rules.extend(builtin_rules());
        }
        Self { rules }
    }

    /// Classify one call by its receiver field's declared type and the
    /// annotations visible on the field (and its type's class).
    pub fn classify(&self, declared_type: &str, annotations: &[String]) -> Option<CallCategory> {
        for rule in &self.rules {
            let hit = match rule.match_kind {
                MatchKind::Annotation => annotations
                    .iter()
                    .any(|a| a == &rule.pattern || simple_name(a) == simple_name(&rule.pattern)),
                MatchKind::TypeName => {
                    declared_type == rule.pattern
                        || simple_name(declared_type) == simple_name(&rule.pattern)
                }
                MatchKind::TypePrefix => declared_type.starts_with(&rule.pattern),
            };
            if hit {
                return Some(rule.category);
            }
        }
        None
    }
}

fn simple_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Vendor table. Order matters only between overlapping patterns; keep
/// specific entries before broad prefixes.
fn builtin_rules() -> Vec<ClassifyRule> {
    use CallCategory::*;
    use MatchKind::*;
    vec![
        // RPC (Dubbo)
        ClassifyRule::new("org.apache.dubbo.config.annotation.DubboReference", Annotation, Rpc),
        ClassifyRule::new("org.apache.dubbo.config.annotation.DubboService", Annotation, Rpc),
        ClassifyRule::new("org.apache.dubbo.config.annotation.Reference", Annotation, Rpc),
        ClassifyRule::new("org.apache.dubbo.config.annotation.Service", Annotation, Rpc),
        ClassifyRule::new("com.alibaba.dubbo.config.annotation.Reference", Annotation, Rpc),
        ClassifyRule::new("com.alibaba.dubbo.config.annotation.Service", Annotation, Rpc),
        // Persistence (MyBatis)
        ClassifyRule::new("org.apache.ibatis.annotations.Mapper", Annotation, Persistence),
        ClassifyRule::new("org.apache.ibatis.", TypePrefix, Persistence),
        ClassifyRule::new("org.mybatis.", TypePrefix, Persistence),
        // Queue (Kafka)
        ClassifyRule::new("org.apache.kafka.clients.producer.KafkaProducer", TypeName, Queue),
        ClassifyRule::new("org.apache.kafka.clients.producer.Producer", TypeName, Queue),
        ClassifyRule::new("org.springframework.kafka.core.KafkaTemplate", TypeName, Queue),
        // Cache (Redis clients)
        ClassifyRule::new("redis.clients.jedis.", TypePrefix, Cache),
        ClassifyRule::new("org.springframework.data.redis.core.RedisTemplate", TypeName, Cache),
        ClassifyRule::new("org.springframework.data.redis.core.StringRedisTemplate", TypeName, Cache),
        ClassifyRule::new("io.lettuce.core.", TypePrefix, Cache),
        // Template clients
        ClassifyRule::new("AriesTemplate", TypeName, Template),
        ClassifyRule::new("org.springframework.web.client.RestTemplate", TypeName, Template),
        // Logging
        ClassifyRule::new("org.slf4j.Logger", TypeName, Log),
        ClassifyRule::new("org.apache.logging.log4j.Logger", TypeName, Log),
        ClassifyRule::new("org.apache.log4j.Logger", TypeName, Log),
        ClassifyRule::new("java.util.logging.Logger", TypeName, Log),
        ClassifyRule::new("ch.qos.logback.classic.Logger", TypeName, Log),
    ]
}

// ─────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── built-in table ────────────────────────────────────────────────

    #[test]
    fn classifies_by_annotation_type_and_prefix() {
        let c = Classifier::default();
        assert_eq!(
            c.classify(
                "com.shop.InventoryClient",
                &["org.apache.dubbo.config.annotation.DubboReference".into()]
            ),
            Some(CallCategory::Rpc)
        );
        assert_eq!(
            c.classify("org.apache.ibatis.session.SqlSession", &[]),
            Some(CallCategory::Persistence)
        );
        assert_eq!(c.classify("org.slf4j.Logger", &[]), Some(CallCategory::Log));
        assert_eq!(c.classify("com.shop.PlainHelper", &[]), None);
    }

    #[test]
    fn simple_names_match_when_imports_were_unresolvable() {
        let c = Classifier::default();
        // The front-end keeps simple names when no import matched.
        assert_eq!(c.classify("KafkaProducer", &[]), Some(CallCategory::Queue));
        assert_eq!(c.classify("Logger", &[]), Some(CallCategory::Log));
        assert_eq!(
            c.classify("Whatever", &["DubboReference".into()]),
            Some(CallCategory::Rpc)
        );
    }

    // ── config extension ──────────────────────────────────────────────

    #[test]
    fn extra_rules_run_before_builtins() {
        let extra = vec![ClassifyRule::new(
            "org.slf4j.Logger",
            MatchKind::TypeName,
            CallCategory::Template,
        )];
        let c = Classifier::with_rules(extra, true);
        assert_eq!(c.classify("org.slf4j.Logger", &[]), Some(CallCategory::Template));
        // Builtins still present for everything else.
        assert_eq!(c.classify("redis.clients.jedis.Jedis", &[]), Some(CallCategory::Cache));
    }

    #[test]
    fn builtins_can_be_disabled() {
        let c = Classifier::with_rules(vec![], false);
        assert_eq!(c.classify("org.slf4j.Logger", &[]), None);
    }
}
