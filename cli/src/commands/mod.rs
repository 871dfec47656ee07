mod food;
mod helpers;
mod meal;
mod records;

pub(crate) use food::{cmd_food_add, cmd_food_import, cmd_food_search};
pub(crate) use meal::{DoseArgs, cmd_actual, cmd_calc, cmd_dose, cmd_ratio};
pub(crate) use records::{cmd_init, cmd_records};
