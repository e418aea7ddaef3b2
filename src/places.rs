use crate::config::PlacesConfig;

/// Built-in province -> notable places mapping, used when the config file
/// has no `[[places]]` entries. Province names follow the geoBoundaries
/// `shapeName` spelling.
const DEFAULT_PLACES: &[(&str, &[&str])] = &[
    ("Ontario", &["CN Tower", "Niagara Falls", "Parliament Hill", "Algonquin"]),
    ("Quebec", &["Château Frontenac", "Mont-Royal", "Montmorency", "Tadoussac"]),
    ("British Columbia", &["Stanley Park", "Butchart Gardens", "Whistler", "Capilano"]),
    ("Alberta", &["Banff", "Lake Louise", "Jasper", "Drumheller"]),
    ("Manitoba", &["The Forks", "Churchill", "Riding Mountain"]),
    ("Saskatchewan", &["Wanuskewin", "Grasslands", "Wascana"]),
    ("Nova Scotia", &["Peggy's Cove", "Citadel", "Cabot Trail", "Lunenburg"]),
    ("New Brunswick", &["Hopewell Rocks", "Fundy", "Reversing Falls"]),
    ("Prince Edward Island", &["Green Gables", "Cavendish", "Confederation Centre"]),
    ("Newfoundland and Labrador", &["Signal Hill", "Gros Morne", "L'Anse aux Meadows"]),
    ("Yukon", &["Kluane", "Miles Canyon", "Dawson"]),
    ("Northwest Territories", &["Nahanni", "Great Slave", "Wood Buffalo"]),
    ("Nunavut", &["Auyuittuq", "Sylvia Grinnell", "Quttinirpaaq"]),
];

pub fn default_places() -> Vec<PlacesConfig> {
    DEFAULT_PLACES
        .iter()
        .map(|(province, names)| PlacesConfig {
            province: province.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
        })
        .collect()
}
