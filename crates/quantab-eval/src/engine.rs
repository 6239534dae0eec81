//! The evaluation engine: expression parsing and variable declaration

use crate::compile::ExpressionCompiler;
use crate::expression::{BooleanExpression, NumericExpression};
use crate::registry::VariableRegistry;
use crate::sync::synchronize_group_instances;
use crate::variable::{CompiledVariable, VariableCompiler};
use parking_lot::Mutex;
use quantab_diagnostics::{EngineError, Result, QTB0105, QTB0107};
use quantab_model::{
    EntityRepository, FieldCatalog, VariableComponent, VariableConfiguration, VariableGrouping,
};
use std::sync::Arc;

/// Expression and variable evaluation engine
///
/// Holds the field catalog and entity repository it resolves names against,
/// plus the registry of declared variables. Parsing and evaluation take no
/// locks beyond registry reads; declaration is serialized behind a mutex so
/// validation, instance synchronization and publication happen atomically
/// with respect to other declares.
pub struct Engine {
    fields: Arc<dyn FieldCatalog>,
    entities: Arc<dyn EntityRepository>,
    registry: VariableRegistry,
    declare_lock: Mutex<()>,
}

impl Engine {
    /// Create an engine over a field catalog and entity repository
    pub fn new(fields: Arc<dyn FieldCatalog>, entities: Arc<dyn EntityRepository>) -> Self {
        Self {
            fields,
            entities,
            registry: VariableRegistry::new(),
            declare_lock: Mutex::new(()),
        }
    }

    /// The entity repository the engine resolves instances against
    pub fn entities(&self) -> &Arc<dyn EntityRepository> {
        &self.entities
    }

    /// Compile user text into a boolean condition
    ///
    /// Empty or whitespace-only text compiles to the always-true condition.
    pub fn parse_user_boolean_expression(&self, text: &str) -> Result<BooleanExpression> {
        if text.trim().is_empty() {
            return Ok(BooleanExpression::always_true());
        }
        let compiler = ExpressionCompiler {
            fields: self.fields.as_ref(),
            registry: &self.registry,
        };
        Ok(BooleanExpression::new(compiler.compile(text)?))
    }

    /// Compile user text into a numeric expression
    ///
    /// Empty or whitespace-only text means "no expression" and yields
    /// `Ok(None)`.
    pub fn parse_user_numeric_expression_or_null(
        &self,
        text: &str,
    ) -> Result<Option<NumericExpression>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let compiler = ExpressionCompiler {
            fields: self.fields.as_ref(),
            registry: &self.registry,
        };
        Ok(Some(NumericExpression::new(compiler.compile(text)?)))
    }

    /// Validate, compile and publish a variable declaration
    ///
    /// Replaces any prior declaration under the same identifier. A failed
    /// validation or compile leaves the registry and the entity instances
    /// untouched. Question definitions carry no evaluatable content and are
    /// skipped.
    pub fn declare_or_update_variable(&self, config: VariableConfiguration) -> Result<()> {
        if !config.definition.is_evaluatable() {
            log::debug!("skipping non-evaluatable variable '{}'", config.identifier);
            return Ok(());
        }
        let _guard = self.declare_lock.lock();
        self.declare_locked(config)
    }

    fn declare_locked(&self, config: VariableConfiguration) -> Result<()> {
        let compiler = VariableCompiler {
            fields: self.fields.as_ref(),
            registry: &self.registry,
            entities: self.entities.as_ref(),
        };
        let compiled = compiler.compile(&config)?;

        if let (Some(to_entity_type), Some(groups)) = (
            config.definition.to_entity_type(),
            config.definition.groups(),
        ) {
            synchronize_group_instances(
                self.entities.as_ref(),
                to_entity_type,
                &config.name,
                groups,
            );
        }

        log::info!(
            "declared variable '{}' ({})",
            config.identifier,
            if compiled.is_fast_path() {
                "indexed"
            } else {
                "generic"
            }
        );
        self.registry.publish(config, Arc::new(compiled));
        Ok(())
    }

    /// The compiled variable declared under an identifier, if any
    pub fn get_declared_variable_or_null(
        &self,
        identifier: &str,
    ) -> Option<Arc<CompiledVariable>> {
        self.registry.get(identifier)
    }

    /// Identifiers of every declared variable
    pub fn declared_variable_identifiers(&self) -> Vec<String> {
        self.registry.identifiers()
    }

    /// Append a group to a declared grouped variable
    ///
    /// Allocates a fresh instance id on the target entity type atomically
    /// (never reusing a removed id), appends the group and redeclares the
    /// variable. Returns the allocated id.
    pub fn add_group(
        &self,
        variable_identifier: &str,
        group_name: &str,
        component: VariableComponent,
    ) -> Result<i64> {
        let _guard = self.declare_lock.lock();

        let mut config = self.registry.config(variable_identifier).ok_or_else(|| {
            EngineError::validation_for(
                QTB0105,
                format!("No declared variable '{variable_identifier}'"),
                variable_identifier,
            )
        })?;
        let to_entity_type = config
            .definition
            .to_entity_type()
            .ok_or_else(|| {
                EngineError::validation_for(
                    QTB0107,
                    format!("'{variable_identifier}' is not a grouped variable"),
                    variable_identifier,
                )
            })?
            .to_string();

        let instance_id = self.entities.allocate_instance_id(&to_entity_type);
        if let Some(groups) = config.definition.groups_mut() {
            groups.push(VariableGrouping::new(instance_id, group_name, component));
        }
        self.declare_locked(config)?;
        Ok(instance_id)
    }
}
