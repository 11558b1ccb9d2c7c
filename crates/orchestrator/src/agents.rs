use serde::{Deserialize, Serialize};

/// The closed set of implemented domain agents. Routing resolves a wire name
/// to a variant exactly once per turn; unknown names are a first-class
/// routing miss, not a silent fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Study,
    Productivity,
    Wellness,
    Shopping,
    MealPlanner,
}

/// Wire name of the zero-hit fallback classification. Not an implemented
/// agent; routing a planner result is reported as a miss.
pub const PLANNER_SENTINEL: &str = "planner";

impl AgentKind {
    pub const ALL: [AgentKind; 5] = [
        AgentKind::Study,
        AgentKind::Productivity,
        AgentKind::Wellness,
        AgentKind::Shopping,
        AgentKind::MealPlanner,
    ];

    /// Agents the intent classifier may select. The meal planner is only
    /// reachable via an explicit `force_agent`.
    pub const ROUTABLE: [AgentKind; 4] = [
        AgentKind::Study,
        AgentKind::Productivity,
        AgentKind::Wellness,
        AgentKind::Shopping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Study => "study_agent",
            AgentKind::Productivity => "productivity_agent",
            AgentKind::Wellness => "wellness_agent",
            AgentKind::Shopping => "shopping_agent",
            AgentKind::MealPlanner => "meal_planner",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "study_agent" => Some(AgentKind::Study),
            "productivity_agent" => Some(AgentKind::Productivity),
            "wellness_agent" => Some(AgentKind::Wellness),
            "shopping_agent" => Some(AgentKind::Shopping),
            "meal_planner" => Some(AgentKind::MealPlanner),
            _ => None,
        }
    }

    pub fn implemented_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.as_str()).collect()
    }

    /// Keyword list used by the deterministic fallback classifier.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            AgentKind::Study => &[
                "study",
                "learning",
                "exam preparation",
                "notes",
                "remember",
                "recall",
                "revision",
                "syllabus",
                "summarize",
                "concepts",
                "semantic search",
                "study schedule",
            ],
            AgentKind::Productivity => &[
                "task management",
                "scheduling",
                "calendar",
                "goals",
                "deadlines",
                "productivity",
                "time management",
                "project planning",
                "weekly plan",
                "todo",
                "organize work",
            ],
            AgentKind::Wellness => &[
                "exercise",
                "meditation",
                "sleep",
                "mood",
                "health",
                "fitness",
                "wellbeing",
                "mental health",
                "habits",
                "routine",
                "streak",
                "wellness tracking",
            ],
            AgentKind::Shopping => &[
                "meal planning",
                "recipe suggestions",
                "cooking",
                "food preferences",
                "diet",
                "nutrition",
                "grocery",
                "meal prep",
                "shopping list",
                "budget",
                "expenses",
                "meal budget",
            ],
            AgentKind::MealPlanner => &[],
        }
    }

    /// One-line capability summary embedded in the classification prompt.
    pub fn capabilities(&self) -> &'static str {
        match self {
            AgentKind::Study => {
                "Learning support, note organization, exam prep, study schedules, \
                 concept summarization, semantic search"
            }
            AgentKind::Productivity => {
                "Task management, scheduling, goal setting, calendar integration, \
                 time management, progress tracking"
            }
            AgentKind::Wellness => {
                "Exercise tracking, meditation, sleep, mood, health monitoring, \
                 habit streaks, wellness routines"
            }
            AgentKind::Shopping => {
                "Meal planning, recipes, nutrition, grocery lists, shopping budgets, \
                 expense tracking"
            }
            AgentKind::MealPlanner => {
                "Weekly meal plans, recipes, grocery lists, dietary restrictions, \
                 meal prep strategies"
            }
        }
    }

    pub fn system_instruction(&self) -> &'static str {
        match self {
            AgentKind::Study => STUDY_INSTRUCTION,
            AgentKind::Productivity => PRODUCTIVITY_INSTRUCTION,
            AgentKind::Wellness => WELLNESS_INSTRUCTION,
            AgentKind::Shopping => SHOPPING_INSTRUCTION,
            AgentKind::MealPlanner => MEAL_PLANNER_INSTRUCTION,
        }
    }
}

const STUDY_INSTRUCTION: &str = "\
You are a study and learning agent. You help users:
1. Organize study goals into manageable milestones
2. Break down complex topics into key concepts
3. Create study schedules and revision plans
4. Summarize notes and highlight important points
5. Suggest effective learning strategies
6. Prepare for exams with topic breakdowns
7. Track learning progress

Be encouraging, pedagogical, and structured. Help users learn effectively by:
- Breaking complex topics into digestible chunks
- Creating actionable study plans
- Providing clear explanations
- Suggesting resources when helpful";

const PRODUCTIVITY_INSTRUCTION: &str = "\
You are a productivity and task management agent. You help users:
1. Organize tasks and prioritize effectively
2. Create actionable to-do lists and schedules
3. Break down large projects into manageable steps
4. Set realistic goals and deadlines
5. Track progress and maintain accountability
6. Optimize time management
7. Develop productive habits

Be practical, motivating, and results-oriented. Help users be more productive by:
- Using proven productivity frameworks (GTD, Eisenhower Matrix, Pomodoro, etc.)
- Creating clear, actionable plans
- Setting achievable milestones
- Providing time estimates
- Suggesting tools and techniques
- Helping overcome procrastination";

const WELLNESS_INSTRUCTION: &str = "\
You are a wellness and health lifestyle agent. You help users:
1. Build healthy habits and routines
2. Track fitness goals and progress
3. Create sustainable wellness plans
4. Manage stress and mental health
5. Improve sleep quality
6. Stay motivated and accountable
7. Balance work and life

Be supportive, evidence-based, and holistic. Help users improve their wellbeing by:
- Providing science-backed wellness advice
- Creating personalized, sustainable plans
- Focusing on incremental improvements
- Considering physical, mental, and emotional health
- Encouraging self-compassion and realistic goals
- Suggesting mindfulness and stress-relief techniques

When discussing wellness, always:
- Acknowledge individual differences
- Recommend consulting healthcare professionals for medical issues
- Focus on sustainable, long-term changes";

const SHOPPING_INSTRUCTION: &str = "\
You are a shopping and budget management agent. You help users:
1. Create organized shopping lists
2. Track expenses and budgets
3. Find deals and compare prices
4. Plan purchases strategically
5. Avoid impulse buying
6. Organize shopping by category/store
7. Manage subscriptions and recurring expenses

Be practical, budget-conscious, and organized. Help users shop smarter by:
- Creating categorized shopping lists
- Suggesting budget-friendly alternatives
- Prioritizing needs vs wants
- Tracking spending patterns
- Helping with meal-based grocery planning
- Organizing by store/department for efficiency";

const MEAL_PLANNER_INSTRUCTION: &str = "\
You are a meal planning and nutrition agent. You help users:
1. Create balanced meal plans for the week
2. Generate recipes based on dietary preferences
3. Plan grocery shopping lists
4. Accommodate dietary restrictions and allergies
5. Suggest healthy alternatives and substitutions
6. Optimize meal prep and cooking efficiency
7. Track nutritional goals

Be creative, practical, and nutrition-conscious. Help users with their meal
planning by:
- Creating diverse, balanced meal plans
- Considering budget constraints
- Accommodating time limitations
- Respecting dietary preferences (vegetarian, vegan, keto, etc.)
- Providing clear recipes with ingredients
- Suggesting meal prep strategies";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_name_round_trip() {
        for kind in AgentKind::ALL {
            assert_eq!(AgentKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(AgentKind::from_str("nonexistent_agent"), None);
        assert_eq!(AgentKind::from_str(PLANNER_SENTINEL), None);
    }

    #[test]
    fn test_routable_agents_have_keywords() {
        for kind in AgentKind::ROUTABLE {
            assert!(!kind.keywords().is_empty());
        }
        assert!(AgentKind::MealPlanner.keywords().is_empty());
    }

    #[test]
    fn test_implemented_names() {
        let names = AgentKind::implemented_names();
        assert_eq!(names.len(), 5);
        assert!(names.contains(&"study_agent"));
        assert!(names.contains(&"meal_planner"));
        assert!(!names.contains(&PLANNER_SENTINEL));
    }
}
