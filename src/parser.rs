mod loader;
mod xml_parser;

pub use self::{
    loader::{load, load_file, load_xml},
    xml_parser::{parse_file, TreeSource, XmlAttribute, XmlElement},
};
