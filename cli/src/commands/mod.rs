mod calendar;
mod helpers;
mod ingredient;
mod meal;
mod sheet;
mod shop;

pub(crate) use calendar::{cmd_calendar_add, cmd_calendar_remove, cmd_calendar_show};
pub(crate) use ingredient::{
    cmd_ingredient_add, cmd_ingredient_list, cmd_ingredient_search, cmd_ingredient_update,
};
pub(crate) use meal::{
    MealArgs, cmd_meal_add, cmd_meal_delete, cmd_meal_import, cmd_meal_list, cmd_meal_rate,
    cmd_meal_show,
};
pub(crate) use sheet::{cmd_sheet_export, cmd_sheet_import};
pub(crate) use shop::{
    cmd_shop_check, cmd_shop_delete, cmd_shop_generate, cmd_shop_list, cmd_shop_purge,
    cmd_shop_show,
};
