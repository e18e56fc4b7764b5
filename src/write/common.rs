use crate::common;

use std::collections;

/// Processed write parameters, ready for an SDK builder.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct WriteInput {
    pub(crate) expression_attribute_names: Option<collections::HashMap<String, String>>,
    pub(crate) expression_attribute_values: Option<common::Item>,
    pub(crate) table_name: String,
}

impl WriteInput {
    /// Take over the bindings of an expression, returning its text.
    pub(crate) fn merge_expression(&mut self, operation: common::ExpressionInput) -> String {
        self.expression_attribute_names
            .get_or_insert_with(Default::default)
            .extend(operation.expression_attribute_names);
        self.expression_attribute_values
            .get_or_insert_with(Default::default)
            .extend(operation.expression_attribute_values);
        operation.expression
    }
}

/// Arguments common to all write requests (Put, Update, Delete).
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct WriteArgs {
    /// The name of the table to write to.
    pub table_name: String,
}

impl From<WriteArgs> for WriteInput {
    fn from(write_args: WriteArgs) -> Self {
        Self {
            table_name: write_args.table_name,
            ..Default::default()
        }
    }
}

/// apply common write operation settings to a builder
#[macro_export]
macro_rules! apply_write_operation {
    ($builder:expr, $write_operation:expr) => {
        $builder
            .set_expression_attribute_names($write_operation.expression_attribute_names)
            .set_expression_attribute_values($write_operation.expression_attribute_values)
            .table_name($write_operation.table_name)
    };
}
