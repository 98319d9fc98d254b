//! Normalization of data-movement directives into staging descriptors.

use crate::core::error::StagingError;
use crate::core::expression::{basename, parse};
use crate::core::resolver::Resolver;
use crate::core::types::{
    Category, Direction, ExecutionContext, StagingAction, StagingDescriptor, TaskStaging,
};

const INPUT_ORDER: [Category; 4] = [
    Category::Upload,
    Category::Link,
    Category::Copy,
    Category::Download,
];
const OUTPUT_ORDER: [Category; 2] = [Category::Copy, Category::Download];

/// Emission order of categories for a direction.
pub fn category_order(direction: Direction) -> &'static [Category] {
    match direction {
        Direction::Input => &INPUT_ORDER,
        Direction::Output => &OUTPUT_ORDER,
    }
}

/// One declared data movement: each expression yields one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMovementDirective {
    pub category: Category,
    pub direction: Direction,
    pub expressions: Vec<String>,
}

impl DataMovementDirective {
    pub fn new<I, S>(category: Category, direction: Direction, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            category,
            direction,
            expressions: expressions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn input<I, S>(category: Category, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(category, Direction::Input, expressions)
    }

    pub fn output<I, S>(category: Category, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(category, Direction::Output, expressions)
    }
}

/// Build the ordered descriptors for one direction.
///
/// Directives of the other direction are ignored. Any resolution failure
/// aborts the whole build.
pub fn build(
    direction: Direction,
    directives: &[DataMovementDirective],
    context: &ExecutionContext,
    resolver: &Resolver<'_>,
) -> Result<Vec<StagingDescriptor>, StagingError> {
    let order = category_order(direction);
    let selected: Vec<&DataMovementDirective> = directives
        .iter()
        .filter(|directive| directive.direction == direction)
        .collect();

    if let Some(unsupported) = selected
        .iter()
        .find(|directive| !order.contains(&directive.category))
    {
        return Err(StagingError::UnsupportedDirective {
            category: unsupported.category,
            direction,
        });
    }

    let mut descriptors = Vec::new();
    for category in order {
        for directive in selected.iter().filter(|d| d.category == *category) {
            for expression in &directive.expressions {
                descriptors.push(descriptor(expression, *category, context, resolver)?);
            }
        }
    }
    Ok(descriptors)
}

/// Build input and output descriptors for one task.
pub fn build_task_staging(
    directives: &[DataMovementDirective],
    context: &ExecutionContext,
    resolver: &Resolver<'_>,
) -> Result<TaskStaging, StagingError> {
    Ok(TaskStaging {
        input: build(Direction::Input, directives, context, resolver)?,
        output: build(Direction::Output, directives, context, resolver)?,
    })
}

fn descriptor(
    expression: &str,
    category: Category,
    context: &ExecutionContext,
    resolver: &Resolver<'_>,
) -> Result<StagingDescriptor, StagingError> {
    let resolve = |side: &str| {
        resolver
            .resolve(side, context)
            .map_err(|source| StagingError::Resolve {
                expression: expression.to_string(),
                source,
            })
    };

    let parsed = parse(expression);
    let source = resolve(parsed.source)?;
    let target = match parsed.target.filter(|target| !target.is_empty()) {
        Some(target) => resolve(target)?,
        None => basename(&source).to_string(),
    };
    let action = match category {
        Category::Link => Some(StagingAction::Link),
        Category::Copy => Some(StagingAction::Copy),
        Category::Upload | Category::Download => None,
    };

    Ok(StagingDescriptor {
        source,
        target,
        action,
    })
}
