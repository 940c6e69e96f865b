use std::fmt;

const MAP_PREFIX: &str = "maps/";
const MAP_SUFFIX: &str = ".bsp";
const TEXTURE_PREFIX: &str = "textures/";
const LEVELSHOT_PREFIX: &str = "levelshots/";
const SHADER_PREFIX: &str = "scripts/";
const SHADER_SUFFIX: &str = ".shader";
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "tga", "jpg"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Map,
    Texture,
    Levelshot,
    Shader,
}

impl AssetKind {
    pub const ALL: [AssetKind; 4] = [
        AssetKind::Map,
        AssetKind::Texture,
        AssetKind::Levelshot,
        AssetKind::Shader,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Map => "map",
            AssetKind::Texture => "texture",
            AssetKind::Levelshot => "levelshot",
            AssetKind::Shader => "shader",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "map" | "maps" => Some(AssetKind::Map),
            "texture" | "textures" => Some(AssetKind::Texture),
            "levelshot" | "levelshots" => Some(AssetKind::Levelshot),
            "shader" | "shaders" => Some(AssetKind::Shader),
            _ => None,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Where an archive entry goes and the logical name it is indexed under.
///
/// Shader scripts carry no name of their own here: every definition inside
/// the script is indexed by its declared name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetRoute {
    pub kind: AssetKind,
    pub name: String,
}

/// Matches an entry path (forward slashes, case-sensitive) against the
/// map, texture, levelshot and shader patterns.
pub fn classify(path: &str) -> Option<AssetRoute> {
    if let Some(name) = path
        .strip_prefix(MAP_PREFIX)
        .and_then(|rest| rest.strip_suffix(MAP_SUFFIX))
    {
        if name.is_empty() {
            return None;
        }
        return Some(AssetRoute {
            kind: AssetKind::Map,
            name: name.to_string(),
        });
    }
    if path.starts_with(TEXTURE_PREFIX) && image_extension(path).is_some() {
        return Some(AssetRoute {
            kind: AssetKind::Texture,
            name: strip_extension(path).to_string(),
        });
    }
    if let Some(rest) = path.strip_prefix(LEVELSHOT_PREFIX) {
        image_extension(rest)?;
        let name = strip_extension(rest);
        if name.is_empty() {
            return None;
        }
        return Some(AssetRoute {
            kind: AssetKind::Levelshot,
            name: name.to_string(),
        });
    }
    if path.starts_with(SHADER_PREFIX) && path.ends_with(SHADER_SUFFIX) {
        return Some(AssetRoute {
            kind: AssetKind::Shader,
            name: path.to_string(),
        });
    }
    None
}

pub fn image_extension(path: &str) -> Option<&str> {
    let (_, ext) = path.rsplit_once('.')?;
    IMAGE_EXTENSIONS.contains(&ext).then_some(ext)
}

pub fn strip_extension(path: &str) -> &str {
    match path.rfind('.') {
        Some(pos) => &path[..pos],
        None => path,
    }
}
